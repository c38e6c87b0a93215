//! Gmail input crate - extract Gmail messages as typed rows
//!
//! This crate provides:
//! - Domain models (Message, Checkpoint)
//! - Column schema and the message-to-row mapper
//! - Gmail API client and OAuth authentication
//! - Message source and row sink abstractions
//! - Task configuration and the run driver

pub mod config;
pub mod gmail;
pub mod models;
pub mod output;
pub mod run;
pub mod schema;
pub mod source;
pub mod task;

pub use crate::config::GmailCredentials;
pub use gmail::{GmailAuth, GmailClient};
pub use models::{Checkpoint, Message, MessageId};
pub use output::{JsonLinesSink, MemorySink, RowSink};
pub use run::{TaskReport, run_task};
pub use schema::{
    BODY_COLUMN, CoercionError, CoercionFailure, ColumnConfig, ColumnType, DiagnosticSink,
    LogDiagnostics, Row, RowMapper, Schema, SchemaError, Value,
};
pub use source::{InMemorySource, MessageSource, PartialMessage, SearchResult};
pub use task::InputTask;
