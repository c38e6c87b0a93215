//! Task configuration and search query building

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Checkpoint;
use crate::schema::{ColumnConfig, Schema, TimestampDefaults};

fn default_user() -> String {
    "me".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// One extraction task, loaded from a JSON task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTask {
    /// Google Cloud Console client secret JSON
    pub client_secret: PathBuf,
    /// Directory holding the OAuth token file
    pub tokens_directory: PathBuf,
    /// Mailbox to search
    #[serde(default = "default_user")]
    pub user: String,
    /// Base Gmail search query
    #[serde(default)]
    pub query: String,
    /// Appended as `after:<value>`
    #[serde(default, alias = "after_than")]
    pub after: Option<String>,
    /// Appended as `before:<value>`
    #[serde(default)]
    pub before: Option<String>,
    /// Bound each run by the previous run's checkpoint and emit a new one
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub max_messages: Option<usize>,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default)]
    pub default_timestamp_format: Option<String>,
    pub columns: Vec<ColumnConfig>,
}

impl InputTask {
    /// Load a task file. Paths inside it are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut task: InputTask = config::load_json_file(path)?;
        if let Some(base) = path.parent() {
            task.client_secret = base.join(&task.client_secret);
            task.tokens_directory = base.join(&task.tokens_directory);
        }
        Ok(task)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse task JSON")
    }

    pub fn timestamp_defaults(&self) -> TimestampDefaults {
        TimestampDefaults {
            timezone: self.default_timezone.clone(),
            format: self.default_timestamp_format.clone(),
        }
    }

    /// Validate the declared columns
    pub fn schema(&self) -> Result<Schema> {
        Schema::from_config(&self.columns, &self.timestamp_defaults())
            .context("Invalid column configuration")
    }

    /// Build the search query for this run
    ///
    /// The configured `after` bound is replaced by the previous checkpoint
    /// when the task is incremental and a checkpoint exists.
    pub fn build_query(&self, previous: Option<&Checkpoint>) -> String {
        let mut clauses = Vec::new();

        let query = self.query.trim();
        if !query.is_empty() {
            clauses.push(query.to_string());
        }

        match previous.filter(|_| self.incremental) {
            Some(checkpoint) => clauses.push(format!("after:{}", checkpoint.after)),
            None => {
                if let Some(after) = &self.after {
                    clauses.push(format!("after:{}", after));
                }
            }
        }

        if let Some(before) = &self.before {
            clauses.push(format!("before:{}", before));
        }

        clauses.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    const MINIMAL: &str = r#"{
        "client_secret": "client_secret.json",
        "tokens_directory": "tokens",
        "columns": [
            {"name": "Subject", "type": "string"},
            {"name": "Body", "type": "string"}
        ]
    }"#;

    #[test]
    fn test_defaults() {
        let task = InputTask::from_json(MINIMAL).unwrap();
        assert_eq!(task.user, "me");
        assert_eq!(task.query, "");
        assert_eq!(task.default_timezone, "UTC");
        assert!(!task.incremental);
        assert_eq!(task.columns.len(), 2);
        assert_eq!(task.columns[1].column_type, ColumnType::String);
    }

    #[test]
    fn test_missing_columns_is_error() {
        let json = r#"{"client_secret": "a.json", "tokens_directory": "t"}"#;
        assert!(InputTask::from_json(json).is_err());
    }

    #[test]
    fn test_after_than_alias() {
        let json = r#"{
            "client_secret": "a.json",
            "tokens_directory": "t",
            "query": "from:alerts@example.com",
            "after_than": "2024/01/01",
            "columns": [{"name": "Subject", "type": "string"}]
        }"#;
        let task = InputTask::from_json(json).unwrap();
        assert_eq!(task.after.as_deref(), Some("2024/01/01"));
        assert_eq!(
            task.build_query(None),
            "from:alerts@example.com after:2024/01/01"
        );
    }

    #[test]
    fn test_build_query_clauses() {
        let mut task = InputTask::from_json(MINIMAL).unwrap();
        assert_eq!(task.build_query(None), "");

        task.query = " label:reports ".to_string();
        task.before = Some("2024/02/01".to_string());
        assert_eq!(task.build_query(None), "label:reports before:2024/02/01");
    }

    #[test]
    fn test_checkpoint_replaces_after_when_incremental() {
        let mut task = InputTask::from_json(MINIMAL).unwrap();
        task.query = "label:reports".to_string();
        task.after = Some("2024/01/01".to_string());
        let checkpoint = Checkpoint::new(1_700_000_000);

        assert_eq!(
            task.build_query(Some(&checkpoint)),
            "label:reports after:2024/01/01"
        );

        task.incremental = true;
        assert_eq!(
            task.build_query(Some(&checkpoint)),
            "label:reports after:1700000000"
        );
        assert_eq!(task.build_query(None), "label:reports after:2024/01/01");
    }

    #[test]
    fn test_schema_rejects_json_column() {
        let json = r#"{
            "client_secret": "a.json",
            "tokens_directory": "t",
            "columns": [{"name": "Payload", "type": "json"}]
        }"#;
        let task = InputTask::from_json(json).unwrap();
        let err = task.schema().unwrap_err();
        assert!(format!("{:#}", err).contains("json"));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, MINIMAL).unwrap();

        let task = InputTask::from_file(&path).unwrap();
        assert_eq!(task.client_secret, dir.path().join("client_secret.json"));
        assert_eq!(task.tokens_directory, dir.path().join("tokens"));
    }
}
