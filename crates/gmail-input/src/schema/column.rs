//! Column declarations and the validated schema built from them

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::timestamp::{TimestampParser, TimezoneError};

/// Declared type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Long,
    Double,
    String,
    Timestamp,
    /// Accepted by the config format but rejected when the schema is built
    Json,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
            ColumnType::String => "string",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        };
        f.write_str(name)
    }
}

/// One entry of the `columns` list in a task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// strftime-style format, timestamp columns only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// UTC or a fixed offset, timestamp columns only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ColumnConfig {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            format: None,
            timezone: None,
        }
    }
}

/// Task-level timestamp settings used by columns that don't set their own
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampDefaults {
    pub timezone: String,
    pub format: Option<String>,
}

impl Default for TimestampDefaults {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            format: None,
        }
    }
}

/// Errors found while building a schema from column declarations
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("No columns configured")]
    NoColumns,

    #[error("Column {column:?} is declared more than once")]
    DuplicateColumn { column: String },

    #[error(
        "Column {column:?} is declared as json, which this plugin doesn't support. \
         Change the input configuration not to use json columns."
    )]
    UnsupportedJson { column: String },

    #[error("Invalid timezone for column {column:?}: {source}")]
    InvalidTimezone {
        column: String,
        #[source]
        source: TimezoneError,
    },
}

/// Resolved column type; timestamp columns carry their pre-built parser
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Boolean,
    Long,
    Double,
    String,
    Timestamp(TimestampParser),
}

impl ColumnKind {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnKind::Boolean => ColumnType::Boolean,
            ColumnKind::Long => ColumnType::Long,
            ColumnKind::Double => ColumnType::Double,
            ColumnKind::String => ColumnType::String,
            ColumnKind::Timestamp(_) => ColumnType::Timestamp,
        }
    }
}

/// A validated output column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub index: usize,
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered, validated list of output columns
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Validate column declarations
    ///
    /// Fails on json columns and unparsable timezones, so a bad configuration
    /// is reported before any message is fetched.
    pub fn from_config(
        columns: &[ColumnConfig],
        defaults: &TimestampDefaults,
    ) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = columns.iter().find(|&c| !seen.insert(c.name.as_str())) {
            return Err(SchemaError::DuplicateColumn {
                column: duplicate.name.clone(),
            });
        }

        let columns = columns
            .iter()
            .enumerate()
            .map(|(index, config)| {
                let kind = match config.column_type {
                    ColumnType::Boolean => ColumnKind::Boolean,
                    ColumnType::Long => ColumnKind::Long,
                    ColumnType::Double => ColumnKind::Double,
                    ColumnType::String => ColumnKind::String,
                    ColumnType::Timestamp => {
                        let format = config.format.clone().or_else(|| defaults.format.clone());
                        let timezone = config.timezone.as_deref().unwrap_or(&defaults.timezone);
                        let parser = TimestampParser::new(format, timezone).map_err(|source| {
                            SchemaError::InvalidTimezone {
                                column: config.name.clone(),
                                source,
                            }
                        })?;
                        ColumnKind::Timestamp(parser)
                    }
                    ColumnType::Json => {
                        return Err(SchemaError::UnsupportedJson {
                            column: config.name.clone(),
                        });
                    }
                };

                Ok(ColumnSpec {
                    index,
                    name: config.name.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_preserves_order() {
        let schema = Schema::from_config(
            &[
                ColumnConfig::new("Subject", ColumnType::String),
                ColumnConfig::new("Date", ColumnType::Timestamp),
                ColumnConfig::new("X-Count", ColumnType::Long),
            ],
            &TimestampDefaults::default(),
        )
        .unwrap();

        let names: Vec<_> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Subject", "Date", "X-Count"]);
        assert_eq!(schema.columns()[2].index, 2);
        assert_eq!(schema.columns()[1].kind.column_type(), ColumnType::Timestamp);
    }

    #[test]
    fn test_json_column_rejected() {
        let err = Schema::from_config(
            &[
                ColumnConfig::new("Subject", ColumnType::String),
                ColumnConfig::new("Payload", ColumnType::Json),
            ],
            &TimestampDefaults::default(),
        )
        .unwrap_err();

        assert!(matches!(err, SchemaError::UnsupportedJson { ref column } if column == "Payload"));
        assert!(err.to_string().contains("not to use json"));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let mut column = ColumnConfig::new("Date", ColumnType::Timestamp);
        column.timezone = Some("Mars/Olympus".to_string());

        let err = Schema::from_config(&[column], &TimestampDefaults::default()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidTimezone { .. }));
    }

    #[test]
    fn test_column_overrides_defaults() {
        let mut column = ColumnConfig::new("Date", ColumnType::Timestamp);
        column.timezone = Some("+09:00".to_string());
        let defaults = TimestampDefaults {
            timezone: "UTC".to_string(),
            format: Some("%Y-%m-%d".to_string()),
        };

        let schema = Schema::from_config(&[column], &defaults).unwrap();
        match &schema.columns()[0].kind {
            ColumnKind::Timestamp(parser) => {
                assert_eq!(parser.format(), Some("%Y-%m-%d"));
                assert_eq!(parser.timezone().local_minus_utc(), 9 * 3600);
            }
            other => panic!("expected timestamp column, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Schema::from_config(
            &[
                ColumnConfig::new("Date", ColumnType::String),
                ColumnConfig::new("Subject", ColumnType::String),
                ColumnConfig::new("Date", ColumnType::Timestamp),
            ],
            &TimestampDefaults::default(),
        )
        .unwrap_err();

        assert!(matches!(err, SchemaError::DuplicateColumn { ref column } if column == "Date"));
    }

    #[test]
    fn test_empty_columns_rejected() {
        assert!(matches!(
            Schema::from_config(&[], &TimestampDefaults::default()),
            Err(SchemaError::NoColumns)
        ));
    }

    #[test]
    fn test_column_type_from_json() {
        let column: ColumnConfig =
            serde_json::from_str(r#"{"name": "Date", "type": "timestamp", "format": "%Y"}"#)
                .unwrap();
        assert_eq!(column.column_type, ColumnType::Timestamp);
        assert_eq!(column.format.as_deref(), Some("%Y"));
        assert!(serde_json::from_str::<ColumnConfig>(r#"{"name": "X", "type": "blob"}"#).is_err());
    }
}
