//! Fixed-size batching of prepared rows

use crate::error::MigrationResult;
use crate::storage::{BatchExecutor, PreparedRow, SqlValue};

/// Buffers rows and issues one multi-row write per full batch.
///
/// Batches go out in encounter order. A row with a different statement than
/// the buffered ones flushes the buffer first, so every call carries a single
/// statement template.
pub struct BatchWriter<'a> {
    executor: &'a dyn BatchExecutor,
    batch_size: usize,
    sql: Option<String>,
    pending: Vec<Vec<SqlValue>>,
    batches_written: usize,
}

impl<'a> BatchWriter<'a> {
    /// Create a writer; `batch_size` of zero is treated as one
    #[must_use]
    pub fn new(executor: &'a dyn BatchExecutor, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            executor,
            batch_size,
            sql: None,
            pending: Vec::with_capacity(batch_size),
            batches_written: 0,
        }
    }

    /// Buffer a row. Returns the number of rows written by any flush it caused.
    pub async fn push(&mut self, row: PreparedRow) -> MigrationResult<usize> {
        let mut written = 0;
        if self.sql.as_deref().is_some_and(|sql| sql != row.sql) {
            written += self.flush().await?;
        }
        if self.sql.is_none() {
            self.sql = Some(row.sql);
        }
        self.pending.push(row.params);
        if self.pending.len() >= self.batch_size {
            written += self.flush().await?;
        }
        Ok(written)
    }

    /// Write whatever is buffered. Returns the number of rows written.
    pub async fn flush(&mut self) -> MigrationResult<usize> {
        let Some(sql) = self.sql.take() else {
            return Ok(0);
        };
        if self.pending.is_empty() {
            return Ok(0);
        }
        let rows = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        tracing::debug!(rows = rows.len(), batch = self.batches_written + 1, "Writing batch");
        self.executor.execute_batch(&sql, &rows).await?;
        self.batches_written += 1;
        Ok(rows.len())
    }

    /// Flush the partial tail batch
    pub async fn finish(mut self) -> MigrationResult<usize> {
        self.flush().await
    }

    /// Rows waiting for the next flush
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Batches written so far
    #[must_use]
    pub const fn batches_written(&self) -> usize {
        self.batches_written
    }
}
