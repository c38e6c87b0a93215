//! Sink trait definition

use anyhow::Result;

use crate::schema::Row;

/// Receives fully built rows
pub trait RowSink {
    /// Append one row
    fn add_record(&mut self, row: &Row) -> Result<()>;

    /// Flush anything buffered; called once per run
    fn finish(&mut self) -> Result<()>;
}
