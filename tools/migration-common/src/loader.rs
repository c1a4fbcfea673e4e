//! Tolerant JSON snapshot loading
//!
//! Snapshot files are occasionally written twice into the same file or cut
//! off mid-write. The loader recovers the last complete top-level object in
//! those cases instead of failing the whole migration.

use crate::error::{MigrationError, MigrationResult};
use crate::JsonMap;
use serde_json::{Deserializer, Value};
use std::path::Path;

/// Load one JSON object from `path`, recovering from trailing garbage and
/// concatenated objects.
///
/// When several top-level objects are present the last one wins. Callers that
/// rely on the first object must not use this function.
pub fn load_json_document(path: &Path) -> MigrationResult<JsonMap> {
    let content = std::fs::read_to_string(path)?;
    parse_json_document(&content, path)
}

/// Like [`load_json_document`], but a missing file yields an empty map.
pub fn load_optional_json_document(path: &Path) -> MigrationResult<JsonMap> {
    if !path.exists() {
        tracing::warn!(path = ?path, "Snapshot file not found; treating as empty");
        return Ok(JsonMap::new());
    }
    load_json_document(path)
}

/// Parse already-read file content. `path` is only used for diagnostics.
pub fn parse_json_document(content: &str, path: &Path) -> MigrationResult<JsonMap> {
    let original = match serde_json::from_str::<JsonMap>(content) {
        Ok(map) => return Ok(map),
        Err(err) => err,
    };

    tracing::warn!(
        path = ?path,
        error = %original,
        "JSON parse failed; retrying with streaming decode"
    );

    let mut stream = Deserializer::from_str(content).into_iter::<Value>();
    let mut parsed_values = 0usize;
    let mut last_object: Option<JsonMap> = None;

    loop {
        match stream.next() {
            None => break,
            Some(Ok(Value::Object(map))) => {
                parsed_values += 1;
                last_object = Some(map);
            }
            Some(Ok(other)) => {
                parsed_values += 1;
                tracing::warn!(
                    path = ?path,
                    root_type = json_type_name(&other),
                    "Unexpected JSON root type; value discarded"
                );
            }
            Some(Err(inner)) => {
                if last_object.is_some() {
                    tracing::warn!(
                        path = ?path,
                        offset = stream.byte_offset(),
                        error = %inner,
                        "Trailing JSON data ignored"
                    );
                    break;
                }
                return Err(MigrationError::Parse {
                    path: path.to_path_buf(),
                    source: original,
                });
            }
        }
    }

    let Some(object) = last_object else {
        return Err(MigrationError::Parse {
            path: path.to_path_buf(),
            source: original,
        });
    };

    if parsed_values > 1 {
        tracing::warn!(
            path = ?path,
            parsed = parsed_values,
            "Multiple JSON objects found; using last"
        );
    }
    Ok(object)
}

/// Short name of a JSON value's type, used in log lines.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn parse(content: &str) -> MigrationResult<JsonMap> {
        parse_json_document(content, Path::new("test.json"))
    }

    #[test]
    fn single_object_is_returned_as_is() {
        let map = parse(r#"{"a": 1, "b": {"c": [1, 2]}}"#).expect("parse");
        assert_eq!(Value::Object(map), json!({"a": 1, "b": {"c": [1, 2]}}));
    }

    #[test]
    fn last_of_concatenated_objects_wins() {
        let map = parse("{\"a\": 1}\n  {\"a\": 2}\n{\"a\": 3}\n").expect("parse");
        assert_eq!(map.get("a"), Some(&json!(3)));
    }

    #[test]
    fn objects_without_separating_whitespace_are_recovered() {
        let map = parse(r#"{"a": 1}{"b": 2}"#).expect("parse");
        assert_eq!(Value::Object(map), json!({"b": 2}));
    }

    #[test]
    fn trailing_garbage_is_discarded() {
        let map = parse(r#"{"keep": true} garbage{{"#).expect("parse");
        assert_eq!(map.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn truncated_second_object_keeps_first() {
        let map = parse(r#"{"id": "x"}{"id": "y", "val"#).expect("parse");
        assert_eq!(map.get("id"), Some(&json!("x")));
    }

    #[test]
    fn non_object_values_do_not_replace_last_good() {
        let map = parse(r#"{"a": 1} [1, 2, 3] "#).expect("parse");
        assert_eq!(map.get("a"), Some(&json!(1)));
    }

    #[test]
    fn no_leading_object_returns_original_error() {
        let err = parse("not json at all").expect_err("must fail");
        assert!(matches!(err, MigrationError::Parse { .. }));

        let err = parse("").expect_err("empty must fail");
        assert!(matches!(err, MigrationError::Parse { .. }));
    }

    #[test]
    fn array_only_document_is_rejected() {
        let err = parse("[1, 2]").expect_err("array root");
        assert!(matches!(err, MigrationError::Parse { .. }));
    }

    #[test]
    fn loads_from_disk_and_tolerates_missing_optional() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("kv_store_full_docs.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(file, r#"{{"doc-1": {{"content": "hello"}}}}"#).expect("write");

        let map = load_json_document(&path).expect("load");
        assert!(map.contains_key("doc-1"));

        let missing = dir.path().join("kv_store_llm_response_cache.json");
        assert!(load_optional_json_document(&missing).expect("optional").is_empty());
        assert!(matches!(
            load_json_document(&missing),
            Err(MigrationError::Io(_))
        ));
    }
}
