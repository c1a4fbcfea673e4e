//! Checkpoint management for resumable table scans

use crate::error::{MigrationError, MigrationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Position of a re-embedding scan, persisted after every page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Record class the cursor belongs to
    pub class: String,
    /// Source table that was being scanned
    pub source_table: String,
    /// Last primary key handed to the target store
    pub last_processed_id: String,
    /// Records written so far
    pub processed: u64,
    /// Records skipped so far
    pub skipped: u64,
    /// Timestamp when checkpoint was created
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Save checkpoint to disk
    pub fn save(&self, path: &Path) -> MigrationResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(
            path = ?path,
            last_id = %self.last_processed_id,
            processed = self.processed,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load checkpoint from disk
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&json)?;
        tracing::info!(
            path = ?path,
            processed = checkpoint.processed,
            last_id = %checkpoint.last_processed_id,
            "Checkpoint loaded"
        );
        Ok(checkpoint)
    }
}

/// Manages the checkpoint file of one record class
pub struct CheckpointManager {
    checkpoint_file: PathBuf,
    class: String,
    source_table: String,
    last_checkpoint: Option<Checkpoint>,
}

impl CheckpointManager {
    /// Manager writing `reembed_<class>.checkpoint.json` inside `dir`
    pub fn in_dir(dir: &Path, class: &str, source_table: &str) -> MigrationResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            checkpoint_file: dir.join(format!("reembed_{class}.checkpoint.json")),
            class: class.to_string(),
            source_table: source_table.to_string(),
            last_checkpoint: None,
        })
    }

    /// Path of the checkpoint file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.checkpoint_file
    }

    /// Load an existing checkpoint if one was left by an earlier run.
    ///
    /// A checkpoint written for another source table is refused, since its
    /// cursor means nothing for this scan.
    pub fn load_existing(&mut self) -> MigrationResult<Option<Checkpoint>> {
        if !self.checkpoint_file.exists() {
            return Ok(None);
        }
        let checkpoint = Checkpoint::load(&self.checkpoint_file)?;
        if checkpoint.class != self.class || checkpoint.source_table != self.source_table {
            return Err(MigrationError::Checkpoint(format!(
                "{} belongs to {}/{}, expected {}/{}",
                self.checkpoint_file.display(),
                checkpoint.class,
                checkpoint.source_table,
                self.class,
                self.source_table
            )));
        }
        self.last_checkpoint = Some(checkpoint.clone());
        Ok(Some(checkpoint))
    }

    /// Save a checkpoint
    pub fn save_checkpoint(
        &mut self,
        last_processed_id: &str,
        processed: u64,
        skipped: u64,
    ) -> MigrationResult<()> {
        let checkpoint = Checkpoint {
            class: self.class.clone(),
            source_table: self.source_table.clone(),
            last_processed_id: last_processed_id.to_string(),
            processed,
            skipped,
            timestamp: Utc::now(),
        };
        checkpoint.save(&self.checkpoint_file)?;
        self.last_checkpoint = Some(checkpoint);
        Ok(())
    }

    /// Remove the checkpoint after the class finished
    pub fn complete(&mut self) -> MigrationResult<()> {
        if self.checkpoint_file.exists() {
            std::fs::remove_file(&self.checkpoint_file)?;
            tracing::info!(path = ?self.checkpoint_file, "Checkpoint cleared");
        }
        self.last_checkpoint = None;
        Ok(())
    }

    /// Most recent checkpoint saved or loaded
    #[must_use]
    pub const fn last(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.as_ref()
    }
}
