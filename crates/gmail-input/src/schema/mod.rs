//! Column schema and message-to-row mapping
//!
//! The operator-declared column list is authoritative: every message becomes
//! exactly one row with one cell per column, and header text that does not
//! fit a column's type becomes a null cell instead of an error.

mod column;
mod mapper;
mod timestamp;
mod value;

pub use column::{ColumnConfig, ColumnKind, ColumnSpec, ColumnType, Schema, SchemaError, TimestampDefaults};
pub use mapper::{
    BODY_COLUMN, CoercionError, CoercionFailure, DiagnosticSink, LogDiagnostics, RowMapper,
};
pub use timestamp::{TimestampError, TimestampParser, TimezoneError, parse_timezone};
pub use value::{Row, Value};
