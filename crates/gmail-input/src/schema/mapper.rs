//! Message-to-row mapping
//!
//! Each column resolves a raw string (the `Body` column reads the decoded
//! body, every other column reads the header of the same name) and coerces
//! it to the declared type. Missing values and failed coercions both become
//! null cells; failed coercions are additionally reported to a
//! [`DiagnosticSink`].

use log::error;
use std::num::{ParseFloatError, ParseIntError};

use super::column::{ColumnKind, ColumnSpec, Schema};
use super::timestamp::TimestampError;
use super::value::{Row, Value};
use crate::models::{Message, MessageId};

/// Column name that maps to the message body instead of a header
pub const BODY_COLUMN: &str = "Body";

/// Header text that does not fit the declared column type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("NumberFormatError: {value:?} is not a long: {source}")]
    Long {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("NumberFormatError: {value:?} is not a double: {source}")]
    Double {
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("TimestampParseError: {value:?} is not a timestamp: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: TimestampError,
    },
}

/// A coercion failure for one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    pub message_id: MessageId,
    pub column: String,
    pub error: CoercionError,
}

/// Receives coercion failures while rows are mapped
pub trait DiagnosticSink {
    fn record(&mut self, message: &Message, failure: CoercionFailure);
}

/// Collects failures in memory
impl DiagnosticSink for Vec<CoercionFailure> {
    fn record(&mut self, _message: &Message, failure: CoercionFailure) {
        self.push(failure);
    }
}

/// Logs each failure with the message's header snapshot and counts them
#[derive(Debug, Default)]
pub struct LogDiagnostics {
    recorded: usize,
}

impl LogDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl DiagnosticSink for LogDiagnostics {
    fn record(&mut self, message: &Message, failure: CoercionFailure) {
        self.recorded += 1;
        error!(
            "Message {} column {:?}: {}; headers: {:?}",
            failure.message_id,
            failure.column,
            failure.error,
            message.headers()
        );
    }
}

/// Maps messages to rows for a fixed schema
#[derive(Debug, Clone)]
pub struct RowMapper {
    schema: Schema,
}

impl RowMapper {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Build one row with a cell per column, in schema order
    pub fn map(&self, message: &Message, diagnostics: &mut dyn DiagnosticSink) -> Row {
        let values = self
            .schema
            .columns()
            .iter()
            .map(|column| {
                let Some(raw) = raw_value(message, column) else {
                    return Value::Null;
                };

                coerce(&column.kind, raw).unwrap_or_else(|error| {
                    diagnostics.record(
                        message,
                        CoercionFailure {
                            message_id: message.id.clone(),
                            column: column.name.clone(),
                            error,
                        },
                    );
                    Value::Null
                })
            })
            .collect();

        Row::new(values)
    }
}

fn raw_value<'a>(message: &'a Message, column: &ColumnSpec) -> Option<&'a str> {
    if column.name == BODY_COLUMN {
        message.body()
    } else {
        message.header(&column.name)
    }
}

fn coerce(kind: &ColumnKind, raw: &str) -> Result<Value, CoercionError> {
    match kind {
        ColumnKind::Boolean => Ok(Value::Boolean(raw.eq_ignore_ascii_case("true"))),
        ColumnKind::Long => raw.parse::<i64>().map(Value::Long).map_err(|source| CoercionError::Long {
            value: raw.to_string(),
            source,
        }),
        ColumnKind::Double => raw
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|source| CoercionError::Double {
                value: raw.to_string(),
                source,
            }),
        ColumnKind::String => Ok(Value::String(raw.to_string())),
        ColumnKind::Timestamp(parser) => parser
            .parse(raw)
            .map(Value::Timestamp)
            .map_err(|source| CoercionError::Timestamp {
                value: raw.to_string(),
                source,
            }),
    }
}
