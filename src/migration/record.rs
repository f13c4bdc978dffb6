//! `MigrationRecord` - Represents entries in the migration state table

use crate::executor::Row;
use crate::migration::MigrationError;
use chrono::{DateTime, NaiveDateTime, Utc};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Represents a migration record in the state table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// Checksum of the migration at the time it was applied
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        version: i64,
        name: String,
        checksum: String,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
        success: bool,
    ) -> Self {
        Self {
            version,
            name,
            checksum,
            applied_at,
            execution_time_ms,
            success,
        }
    }

    /// Create a `MigrationRecord` from a fetched row
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if a column is missing or the timestamp has an
    /// unrecognized format.
    pub fn from_row(row: &Row) -> Result<Self, MigrationError> {
        let text = |column: &str| -> Result<String, MigrationError> {
            match row.get(column) {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) if !other.is_null() => Ok(other.to_string()),
                _ => Err(MigrationError::InvalidFormat(format!(
                    "migration record is missing '{}'",
                    column
                ))),
            }
        };

        let version = text("version")?
            .parse::<i64>()
            .map_err(|e| MigrationError::InvalidFormat(format!("bad migration version: {}", e)))?;
        let applied_at = parse_timestamp(&text("applied_at")?)?;
        let execution_time_ms = row.get("execution_time_ms").and_then(|v| match v {
            serde_json::Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        });
        let success = match row.get("success") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_i64() != Some(0),
            Some(serde_json::Value::String(s)) => matches!(s.as_str(), "1" | "t" | "true"),
            _ => false,
        };

        Ok(Self {
            version,
            name: text("name")?,
            checksum: text("checksum")?,
            applied_at,
            execution_time_ms,
            success,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MigrationError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            MigrationError::InvalidFormat(format!(
                "Failed to parse timestamp '{}': unrecognized format",
                value
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::row;
    use serde_json::json;

    #[test]
    fn parses_driver_representations() {
        let record = MigrationRecord::from_row(&row(json!({
            "version": 20240101120000i64,
            "name": "init",
            "checksum": "abc",
            "applied_at": "2024-01-01 12:00:00.250",
            "execution_time_ms": null,
            "success": 1,
        })))
        .unwrap();
        assert_eq!(record.version, 20240101120000);
        assert_eq!(record.execution_time_ms, None);
        assert!(record.success);
        assert_eq!(record.applied_at.timestamp_subsec_millis(), 250);

        let iso = MigrationRecord::from_row(&row(json!({
            "version": "7",
            "name": "x",
            "checksum": "c",
            "applied_at": "2024-01-01T12:00:00Z",
            "success": true,
        })))
        .unwrap();
        assert_eq!(iso.version, 7);
    }

    #[test]
    fn rejects_unknown_timestamps() {
        let err = MigrationRecord::from_row(&row(json!({
            "version": 1,
            "name": "x",
            "checksum": "c",
            "applied_at": "yesterday",
        })))
        .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidFormat(_)));
    }
}
