use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::RecordError;
use crate::schema::{ColumnDescriptor, SemanticType, PAGERDUTY_INCIDENT};

/// Columns of `pagerduty_incident`, in serialization order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    UptimeEventId,
    SslEventId,
    DeduplicationKey,
    StartedAt,
    EndedAt,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Id,
        Column::UptimeEventId,
        Column::SslEventId,
        Column::DeduplicationKey,
        Column::StartedAt,
        Column::EndedAt,
    ];

    pub fn position(self) -> usize {
        self as usize
    }

    pub fn descriptor(self) -> &'static ColumnDescriptor {
        &PAGERDUTY_INCIDENT.columns[self.position()]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// A single positional value at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Int(i32),
    Text(String),
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn semantic_type(&self) -> Option<SemanticType> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(_) => Some(SemanticType::Integer32),
            FieldValue::Text(_) => Some(SemanticType::Text),
            FieldValue::Timestamp(_) => Some(SemanticType::TimestampWithOffset),
        }
    }
}

impl From<Option<i32>> for FieldValue {
    fn from(v: Option<i32>) -> Self {
        v.map(FieldValue::Int).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<OffsetDateTime>> for FieldValue {
    fn from(v: Option<OffsetDateTime>) -> Self {
        v.map(FieldValue::Timestamp).unwrap_or(FieldValue::Null)
    }
}

/// The six-field form handed to and received from storage.
///
/// This is the only place the positional layout exists; the in-memory record uses named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRow {
    pub id: Option<i32>,
    pub uptime_event_id: Option<i32>,
    pub ssl_event_id: Option<i32>,
    pub deduplication_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

fn check_slot(column: Column, value: &FieldValue) -> Result<(), RecordError> {
    let descriptor = column.descriptor();
    match value.semantic_type() {
        None if descriptor.nullable || descriptor.identity => Ok(()),
        None => Err(RecordError::validation(descriptor.name, "must not be null")),
        Some(t) if t == descriptor.semantic_type => Ok(()),
        Some(t) => Err(RecordError::validation(
            descriptor.name,
            format!(
                "expected {:?} at position {}, got {t:?}",
                descriptor.semantic_type,
                column.position()
            ),
        )),
    }
}

fn as_int(value: FieldValue) -> Option<i32> {
    match value {
        FieldValue::Int(v) => Some(v),
        _ => None,
    }
}

fn as_timestamp(value: FieldValue) -> Option<OffsetDateTime> {
    match value {
        FieldValue::Timestamp(v) => Some(v),
        _ => None,
    }
}

impl IncidentRow {
    pub fn into_values(self) -> [FieldValue; 6] {
        [
            FieldValue::from(self.id),
            FieldValue::from(self.uptime_event_id),
            FieldValue::from(self.ssl_event_id),
            FieldValue::Text(self.deduplication_key),
            FieldValue::Timestamp(self.started_at),
            FieldValue::from(self.ended_at),
        ]
    }

    /// Decode positional values, checking each slot against the table schema.
    pub fn from_values(values: [FieldValue; 6]) -> Result<Self, RecordError> {
        for (column, value) in Column::ALL.iter().zip(values.iter()) {
            check_slot(*column, value)?;
        }

        let [id, uptime_event_id, ssl_event_id, deduplication_key, started_at, ended_at] = values;
        let FieldValue::Text(deduplication_key) = deduplication_key else {
            return Err(RecordError::validation(
                Column::DeduplicationKey.name(),
                "must not be null",
            ));
        };
        let Some(started_at) = as_timestamp(started_at) else {
            return Err(RecordError::validation(
                Column::StartedAt.name(),
                "must not be null",
            ));
        };

        Ok(IncidentRow {
            id: as_int(id),
            uptime_event_id: as_int(uptime_event_id),
            ssl_event_id: as_int(ssl_event_id),
            deduplication_key,
            started_at,
            ended_at: as_timestamp(ended_at),
        })
    }
}

/// Fixed-width UTC form with nanosecond precision. Every value has the same length and a
/// trailing `Z`, so text order is time order.
const STORAGE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

/// Canonical storage form of a timestamp.
pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC).format(STORAGE_FORMAT)
}

/// Accepts the storage form and any RFC3339 timestamp.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let raw = raw.trim();
    match PrimitiveDateTime::parse(raw, STORAGE_FORMAT) {
        Ok(ts) => Ok(ts.assume_utc()),
        Err(_) => OffsetDateTime::parse(raw, &Rfc3339),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn column_enum_matches_schema() {
        for column in Column::ALL {
            assert_eq!(
                PAGERDUTY_INCIDENT.position(column.name()),
                Some(column.position())
            );
        }
        assert_eq!(Column::ALL.len(), PAGERDUTY_INCIDENT.columns.len());
    }

    #[test]
    fn from_values_rejects_type_mismatch() {
        let err = IncidentRow::from_values([
            FieldValue::Null,
            FieldValue::Text("42".to_string()),
            FieldValue::Null,
            FieldValue::Text("k".to_string()),
            FieldValue::Timestamp(datetime!(2024-01-01 00:00 UTC)),
            FieldValue::Null,
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Validation {
                field: "uptime_event_id",
                ..
            }
        ));
    }

    #[test]
    fn from_values_rejects_null_in_required_column() {
        let err = IncidentRow::from_values([
            FieldValue::Int(1),
            FieldValue::Null,
            FieldValue::Null,
            FieldValue::Text("k".to_string()),
            FieldValue::Null,
            FieldValue::Null,
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Validation {
                field: "started_at",
                ..
            }
        ));
    }

    #[test]
    fn storage_timestamps_are_utc() {
        let ts = datetime!(2024-01-01 02:00 +02:00);
        assert_eq!(
            format_timestamp(ts).unwrap(),
            "2024-01-01T00:00:00.000000000Z"
        );
        assert_eq!(parse_timestamp("2024-01-01T00:00:00.000000000Z").unwrap(), ts);
        assert_eq!(parse_timestamp(" 2024-01-01T00:00:00Z ").unwrap(), ts);
        assert_eq!(parse_timestamp("2024-01-01T02:00:00+02:00").unwrap(), ts);
    }

    #[test]
    fn storage_text_sorts_like_time() {
        let whole = datetime!(2024-01-01 00:00:00 UTC);
        let half = datetime!(2024-01-01 00:00:00.5 UTC);
        let later_offset = datetime!(2024-01-01 01:00:00.25 +01:00);
        let a = format_timestamp(whole).unwrap();
        let b = format_timestamp(later_offset).unwrap();
        let c = format_timestamp(half).unwrap();
        assert_eq!(a.len(), c.len());
        assert!(a < b && b < c, "{a} {b} {c}");
        assert_eq!(parse_timestamp(&b).unwrap(), later_offset);
    }
}
