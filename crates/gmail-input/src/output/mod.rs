//! Row sinks
//!
//! Mapped rows are handed to a [`RowSink`] one at a time, in source order.
//! `JsonLinesSink` writes them out; `MemorySink` keeps them for tests.

mod json_lines;
mod memory;
mod traits;

pub use json_lines::JsonLinesSink;
pub use memory::MemorySink;
pub use traits::RowSink;
