use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::RecordError;
use crate::row::{Column, FieldValue, IncidentRow};
use crate::validate::StagedChange;

/// Primary-key projection of a persisted incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecordKey(pub i32);

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The check an incident originated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "event_id", rename_all = "snake_case")]
pub enum IncidentSource {
    Uptime(i32),
    Ssl(i32),
}

/// One row of the `pagerduty_incident` table.
///
/// Notes:
/// - `id` is `None` until storage assigns it ("detached").
/// - `ended_at == None` means the incident is open; setting it is the only way to close it.
/// - Every mutator validates a staged copy first, so a failed call leaves the record as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IncidentRow", into = "IncidentRow")]
pub struct IncidentRecord {
    id: Option<i32>,
    uptime_event_id: Option<i32>,
    ssl_event_id: Option<i32>,
    deduplication_key: String,
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
}

impl IncidentRecord {
    /// Build a new, detached, open incident.
    ///
    /// Exactly one of `uptime_event_id` / `ssl_event_id` is expected in practice, but that is
    /// left to the caller; storage does not enforce it either.
    pub fn create(
        deduplication_key: impl Into<String>,
        started_at: OffsetDateTime,
        uptime_event_id: Option<i32>,
        ssl_event_id: Option<i32>,
    ) -> Result<Self, RecordError> {
        StagedChange::from_candidate(Self {
            id: None,
            uptime_event_id,
            ssl_event_id,
            deduplication_key: deduplication_key.into(),
            started_at,
            ended_at: None,
        })
        .into_valid()
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn uptime_event_id(&self) -> Option<i32> {
        self.uptime_event_id
    }

    pub fn ssl_event_id(&self) -> Option<i32> {
        self.ssl_event_id
    }

    pub fn deduplication_key(&self) -> &str {
        &self.deduplication_key
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.ended_at
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_detached(&self) -> bool {
        self.id.is_none()
    }

    pub fn source(&self) -> Option<IncidentSource> {
        match (self.uptime_event_id, self.ssl_event_id) {
            (Some(id), None) => Some(IncidentSource::Uptime(id)),
            (None, Some(id)) => Some(IncidentSource::Ssl(id)),
            _ => None,
        }
    }

    /// Time between start and end of a closed incident.
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }

    pub fn key(&self) -> Result<RecordKey, RecordError> {
        self.id.map(RecordKey).ok_or_else(|| {
            RecordError::IllegalState(format!(
                "incident {} has no persisted identity yet",
                self.deduplication_key
            ))
        })
    }

    /// Close the incident (or correct the end time of a closed one).
    pub fn set_ended_at(&mut self, ended_at: OffsetDateTime) -> Result<(), RecordError> {
        if self.ended_at == Some(ended_at) {
            return Ok(());
        }
        let previous = self.ended_at;
        StagedChange::new(self, |r| r.ended_at = Some(ended_at)).commit(self)?;
        if let Some(previous) = previous {
            tracing::warn!(
                deduplication_key = %self.deduplication_key,
                %previous,
                corrected = %ended_at,
                "End time of an already closed incident was changed"
            );
        }
        Ok(())
    }

    /// Assign the storage-generated identity. Re-attaching to the same id is a no-op.
    pub fn attach(&mut self, id: i32) -> Result<(), RecordError> {
        match self.id {
            Some(existing) if existing != id => Err(RecordError::IllegalState(format!(
                "incident already attached to id {existing}, refusing id {id}"
            ))),
            Some(_) => Ok(()),
            None => StagedChange::new(self, |r| r.id = Some(id)).commit(self),
        }
    }

    pub fn field(&self, column: Column) -> FieldValue {
        match column {
            Column::Id => FieldValue::from(self.id),
            Column::UptimeEventId => FieldValue::from(self.uptime_event_id),
            Column::SslEventId => FieldValue::from(self.ssl_event_id),
            Column::DeduplicationKey => FieldValue::Text(self.deduplication_key.clone()),
            Column::StartedAt => FieldValue::Timestamp(self.started_at),
            Column::EndedAt => FieldValue::from(self.ended_at),
        }
    }

    pub fn to_row(&self) -> IncidentRow {
        self.clone().into()
    }

    /// Rebuild a record from its six-field form, applying every record rule.
    pub fn from_row(row: IncidentRow) -> Result<Self, RecordError> {
        StagedChange::from_candidate(Self {
            id: row.id,
            uptime_event_id: row.uptime_event_id,
            ssl_event_id: row.ssl_event_id,
            deduplication_key: row.deduplication_key,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
        .into_valid()
    }
}

impl From<IncidentRecord> for IncidentRow {
    fn from(record: IncidentRecord) -> Self {
        IncidentRow {
            id: record.id,
            uptime_event_id: record.uptime_event_id,
            ssl_event_id: record.ssl_event_id,
            deduplication_key: record.deduplication_key,
            started_at: record.started_at,
            ended_at: record.ended_at,
        }
    }
}

impl TryFrom<IncidentRow> for IncidentRecord {
    type Error = RecordError;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        IncidentRecord::from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationState;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn sample() -> IncidentRecord {
        IncidentRecord::create("abc123", datetime!(2024-01-01 00:00 UTC), Some(42), None)
            .expect("create")
    }

    #[test]
    fn create_yields_detached_open_record() {
        let record = sample();
        assert_eq!(record.id(), None);
        assert_eq!(record.ssl_event_id(), None);
        assert_eq!(record.uptime_event_id(), Some(42));
        assert!(record.is_open());
        assert!(record.is_detached());
        assert_eq!(record.source(), Some(IncidentSource::Uptime(42)));
    }

    #[test]
    fn create_rejects_bad_keys() {
        let start = datetime!(2024-01-01 00:00 UTC);
        assert!(IncidentRecord::create("", start, None, None).is_err());
        assert!(IncidentRecord::create("k".repeat(101), start, None, None).is_err());
        assert!(IncidentRecord::create("k".repeat(100), start, None, None).is_ok());
    }

    #[test]
    fn set_ended_at_closes_and_is_idempotent() {
        let mut record = sample();
        let end = datetime!(2024-01-01 00:10 UTC);
        record.set_ended_at(end).expect("close");
        let once = record.clone();
        record.set_ended_at(end).expect("close again");
        assert_eq!(record, once);
        assert!(!record.is_open());
        assert_eq!(record.started_at(), datetime!(2024-01-01 00:00 UTC));
        assert_eq!(record.duration(), Some(Duration::minutes(10)));
    }

    #[test]
    fn closed_incident_end_time_can_be_corrected() {
        let mut record = sample();
        record.set_ended_at(datetime!(2024-01-01 00:10 UTC)).unwrap();
        record.set_ended_at(datetime!(2024-01-01 00:20 UTC)).unwrap();
        assert_eq!(record.ended_at(), Some(datetime!(2024-01-01 00:20 UTC)));
    }

    #[test]
    fn key_requires_identity() {
        let mut record = sample();
        assert!(matches!(record.key(), Err(RecordError::IllegalState(_))));
        record.attach(9).unwrap();
        assert_eq!(record.key().unwrap(), RecordKey(9));
        record.attach(9).unwrap();
        assert!(record.attach(10).is_err());
        assert_eq!(record.id(), Some(9));
    }

    #[test]
    fn staged_change_rejection_is_terminal() {
        let record = sample();
        let mut staged = StagedChange::new(&record, |r| {
            r.ended_at = Some(datetime!(2023-12-31 23:00 UTC));
        });
        assert!(staged.validate().is_err());
        assert_eq!(staged.state(), ValidationState::Rejected);
        assert!(staged.validate().is_err());

        let mut target = record.clone();
        assert!(staged.commit(&mut target).is_err());
        assert_eq!(target, record);
    }

    #[test]
    fn source_is_ambiguous_when_both_or_neither_set() {
        let start = datetime!(2024-01-01 00:00 UTC);
        let both = IncidentRecord::create("both", start, Some(1), Some(2)).unwrap();
        let neither = IncidentRecord::create("neither", start, None, None).unwrap();
        assert_eq!(both.source(), None);
        assert_eq!(neither.source(), None);
    }

    #[test]
    fn field_access_follows_columns() {
        let record = sample();
        let values: Vec<FieldValue> = Column::ALL.iter().map(|c| record.field(*c)).collect();
        assert_eq!(values, record.to_row().into_values().to_vec());
    }
}
