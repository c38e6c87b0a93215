//! In-memory sink

use anyhow::Result;

use super::RowSink;
use crate::schema::Row;

#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<Row>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RowSink for MemorySink {
    fn add_record(&mut self, row: &Row) -> Result<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
