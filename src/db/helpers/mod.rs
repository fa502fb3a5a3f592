use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// SQLite INTEGER is signed; meters and counts are not.
pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{value} does not fit a SQLite INTEGER"))
}

pub fn to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("column {column} holds negative value {value}"))
}

pub fn parse_datetime(value: &str, column: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("column {column} holds invalid timestamp {value:?}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn to_json_column<T: Serialize>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value).with_context(|| format!("failed to encode column {column}"))
}

pub fn from_json_column<T: DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_str(value).with_context(|| format!("failed to decode column {column}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_integers_are_rejected() {
        assert_eq!(to_u64(42, "distance_meters").unwrap(), 42);
        let err = to_u64(-1, "distance_meters").unwrap_err();
        assert!(err.to_string().contains("distance_meters"));
    }

    #[test]
    fn timestamps_normalise_to_utc() {
        let parsed = parse_datetime("2024-05-01T10:00:00+02:00", "start_time").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert!(parse_datetime("yesterday", "start_time").is_err());
    }
}
