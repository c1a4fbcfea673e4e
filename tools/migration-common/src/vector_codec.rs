//! Decoding of stored embedding vectors
//!
//! Vector snapshots were written by several releases. Older ones store a plain
//! array of floats; newer ones store `base64(zlib(f16 little-endian bytes))`.
//! Decoding never fails outward: every problem becomes a [`SkipReason`].

use crate::loader::json_type_name;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use half::f16;
use serde_json::Value;
use std::fmt;
use std::io::{Read, Write};

/// Why a stored vector could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No vector value present
    Missing,
    /// JSON type that no encoding uses
    UnsupportedType(&'static str),
    /// Array element that is not a number
    NonNumeric {
        /// Position of the offending element
        index: usize,
    },
    /// String was not valid base64
    InvalidBase64(String),
    /// Payload was not a zlib stream
    Decompress(String),
    /// Decompressed payload has an odd number of bytes
    TruncatedHalfFloat {
        /// Decompressed payload length
        bytes: usize,
    },
    /// Decoded length differs from the table dimension
    DimensionMismatch {
        /// Decoded vector length
        got: usize,
        /// Configured dimension
        expected: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "vector missing"),
            Self::UnsupportedType(kind) => write!(f, "unsupported vector type: {kind}"),
            Self::NonNumeric { index } => write!(f, "non-numeric element at index {index}"),
            Self::InvalidBase64(e) => write!(f, "invalid base64: {e}"),
            Self::Decompress(e) => write!(f, "zlib decompression failed: {e}"),
            Self::TruncatedHalfFloat { bytes } => {
                write!(f, "payload of {bytes} bytes is not a whole number of f16 values")
            }
            Self::DimensionMismatch { got, expected } => {
                write!(f, "dim mismatch: got {got} expected {expected}")
            }
        }
    }
}

/// Decode a stored vector and check it against `expected_dim`.
///
/// `expected_dim == 0` disables the dimension check. Every skip is logged with
/// the record id.
pub fn decode_vector(
    value: Option<&Value>,
    expected_dim: usize,
    record_id: &str,
) -> Result<Vec<f32>, SkipReason> {
    let decoded = match value {
        None | Some(Value::Null) => Err(SkipReason::Missing),
        Some(Value::Array(items)) => decode_array(items),
        Some(Value::String(encoded)) => decode_compressed_f16(encoded),
        Some(other) => Err(SkipReason::UnsupportedType(json_type_name(other))),
    };

    let vector = match decoded {
        Ok(vector) => vector,
        Err(reason) => {
            log_skip(record_id, &reason);
            return Err(reason);
        }
    };

    if expected_dim != 0 && vector.len() != expected_dim {
        let reason = SkipReason::DimensionMismatch {
            got: vector.len(),
            expected: expected_dim,
        };
        log_skip(record_id, &reason);
        return Err(reason);
    }
    Ok(vector)
}

fn log_skip(record_id: &str, reason: &SkipReason) {
    match reason {
        SkipReason::DimensionMismatch { got, expected } => tracing::warn!(
            record_id = %record_id,
            got = got,
            expected = expected,
            "Vector dim mismatch"
        ),
        SkipReason::Missing => tracing::warn!(record_id = %record_id, "Vector missing"),
        other => tracing::warn!(
            record_id = %record_id,
            reason = %other,
            "Failed to decode vector"
        ),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn decode_array(items: &[Value]) -> Result<Vec<f32>, SkipReason> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_f64()
                .map(|v| v as f32)
                .ok_or(SkipReason::NonNumeric { index })
        })
        .collect()
}

fn decode_compressed_f16(encoded: &str) -> Result<Vec<f32>, SkipReason> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SkipReason::InvalidBase64(e.to_string()))?;

    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(|e| SkipReason::Decompress(e.to_string()))?;

    if raw.len() % 2 != 0 {
        return Err(SkipReason::TruncatedHalfFloat { bytes: raw.len() });
    }

    Ok(raw
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect())
}

/// Encode a vector the way current snapshots store it.
pub fn encode_vector(vector: &[f32]) -> String {
    let raw: Vec<u8> = vector
        .iter()
        .flat_map(|&v| f16::from_f32(v).to_le_bytes())
        .collect();

    // Writing into a Vec cannot fail.
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(&raw).is_err() {
        return String::new();
    }
    STANDARD.encode(encoder.finish().unwrap_or_default())
}
