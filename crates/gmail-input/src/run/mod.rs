//! Run driver
//!
//! One run sends one query, maps every fetched message and writes the rows.

mod extract;

pub use extract::{TaskReport, run_task};
