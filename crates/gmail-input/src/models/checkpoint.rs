//! Checkpoint cursor carried between incremental runs

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lower time bound for the next run's query
///
/// Captured when the query is sent, not when individual messages arrive, so
/// a message received while a run is in flight can be fetched again by the
/// next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unix seconds
    pub after: i64,
}

impl Checkpoint {
    pub fn new(after: i64) -> Self {
        Self { after }
    }

    /// Checkpoint for a run whose query was sent at `at`
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            after: at.timestamp(),
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.after, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_at() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let checkpoint = Checkpoint::at(at);
        assert_eq!(checkpoint.after, 1_709_294_400);
        assert_eq!(checkpoint.as_datetime(), Some(at));
    }

    #[test]
    fn test_checkpoint_json() {
        let checkpoint: Checkpoint = serde_json::from_str(r#"{"after": 1700000000}"#).unwrap();
        assert_eq!(checkpoint, Checkpoint::new(1_700_000_000));
    }
}
