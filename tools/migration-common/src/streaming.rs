//! Cursor-based table scans

use crate::JsonMap;
use crate::error::{MigrationError, MigrationResult};
use crate::storage::{Column, PageQuery, RowSource};

/// Scans one workspace of a table in primary-key order, one page at a time.
///
/// Each page is requested strictly after the last id of the previous page,
/// so rows are visited once as long as ids are immutable. The scan ends on
/// the first empty page.
pub struct TableScan<'a> {
    source: &'a dyn RowSource,
    table: String,
    columns: &'a [Column],
    workspace: String,
    page_size: usize,
    cursor: Option<String>,
    pages: u64,
    exhausted: bool,
}

impl<'a> TableScan<'a> {
    /// Start a scan from the beginning of the table
    #[must_use]
    pub fn new(
        source: &'a dyn RowSource,
        table: impl Into<String>,
        columns: &'a [Column],
        workspace: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            table: table.into(),
            columns,
            workspace: workspace.into(),
            page_size: page_size.max(1),
            cursor: None,
            pages: 0,
            exhausted: false,
        }
    }

    /// Continue after `id` instead of starting at the first row
    pub fn resume_after(&mut self, id: impl Into<String>) {
        self.cursor = Some(id.into());
    }

    /// Fetch the next page; an empty page means the scan is over
    pub async fn next_page(&mut self) -> MigrationResult<Vec<JsonMap>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let query = PageQuery {
            table: &self.table,
            columns: self.columns,
            workspace: &self.workspace,
            after: self.cursor.as_deref(),
            limit: self.page_size,
        };
        let rows = self.source.fetch_page(&query).await?;

        if rows.is_empty() {
            self.exhausted = true;
            return Ok(rows);
        }

        let last_id = rows
            .last()
            .and_then(|row| row.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                MigrationError::Pagination(format!("row without string id in {}", self.table))
            })?
            .to_string();

        if self.cursor.as_deref() == Some(last_id.as_str()) {
            return Err(MigrationError::Pagination(format!(
                "cursor did not advance past {last_id} in {}",
                self.table
            )));
        }

        self.cursor = Some(last_id);
        self.pages += 1;
        Ok(rows)
    }

    /// Last id returned so far
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Non-empty pages fetched so far
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }
}
