//! JSON Lines sink
//!
//! One JSON object per row, keyed by column name, in schema order.

use anyhow::{Context, Result};
use std::io::Write;

use super::RowSink;
use crate::schema::{Row, Schema};

pub struct JsonLinesSink<W: Write> {
    writer: W,
    columns: Vec<String>,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, schema: &Schema) -> Self {
        Self {
            writer,
            columns: schema.columns().iter().map(|c| c.name.clone()).collect(),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn add_record(&mut self, row: &Row) -> Result<()> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .zip(row.values())
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();

        serde_json::to_writer(&mut self.writer, &object).context("Failed to serialize row")?;
        self.writer
            .write_all(b"\n")
            .context("Failed to write row")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output")
    }
}
