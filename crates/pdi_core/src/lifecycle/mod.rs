use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::{IncidentRecord, IncidentSource};
use crate::error::AppError;
use crate::repo;

impl IncidentSource {
    /// Token identifying the ongoing failure behind this source. Repeated failing checks that
    /// reference the same event produce the same key, so they map onto one incident.
    pub fn deduplication_key(&self) -> String {
        match self {
            IncidentSource::Uptime(event_id) => format!("uptime_event_{event_id}"),
            IncidentSource::Ssl(event_id) => format!("ssl_event_{event_id}"),
        }
    }

    /// Detached, open record for a failure first seen at `started_at`.
    pub fn new_incident(&self, started_at: OffsetDateTime) -> Result<IncidentRecord, AppError> {
        let (uptime, ssl) = match *self {
            IncidentSource::Uptime(id) => (Some(id), None),
            IncidentSource::Ssl(id) => (None, Some(id)),
        };
        Ok(IncidentRecord::create(
            self.deduplication_key(),
            started_at,
            uptime,
            ssl,
        )?)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "incident", rename_all = "snake_case")]
pub enum OpenOutcome {
    Opened(IncidentRecord),
    /// An open incident already owns the deduplication key.
    AlreadyOpen(IncidentRecord),
    /// The deduplication key belongs to an incident that has ended. It is not reopened.
    AlreadyClosed(IncidentRecord),
}

impl OpenOutcome {
    pub fn incident(&self) -> &IncidentRecord {
        match self {
            OpenOutcome::Opened(r)
            | OpenOutcome::AlreadyOpen(r)
            | OpenOutcome::AlreadyClosed(r) => r,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "incident", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved(IncidentRecord),
    AlreadyClosed(IncidentRecord),
    NotFound,
}

/// Persist a new incident unless one with the same deduplication key already exists.
///
/// The unique index is the arbiter: a conflicting insert is turned into `AlreadyOpen` or
/// `AlreadyClosed` instead of a storage failure, which also covers two checks racing to open the same incident.
pub fn open_incident(
    conn: &Connection,
    record: &IncidentRecord,
) -> Result<OpenOutcome, AppError> {
    match repo::insert_incident(conn, record) {
        Ok(persisted) => {
            tracing::info!(
                id = persisted.id(),
                deduplication_key = %persisted.deduplication_key(),
                started_at = %persisted.started_at(),
                "Incident opened"
            );
            Ok(OpenOutcome::Opened(persisted))
        }
        Err(err) if err.code == repo::CODE_DEDUP_KEY_CONFLICT => {
            let Some(existing) = repo::find_by_deduplication_key(conn, record.deduplication_key())?
            else {
                return Err(err);
            };
            if existing.is_open() {
                tracing::debug!(
                    id = existing.id(),
                    deduplication_key = %existing.deduplication_key(),
                    "Incident already open"
                );
                Ok(OpenOutcome::AlreadyOpen(existing))
            } else {
                tracing::warn!(
                    id = existing.id(),
                    deduplication_key = %existing.deduplication_key(),
                    "Deduplication key belongs to a closed incident; not reopening"
                );
                Ok(OpenOutcome::AlreadyClosed(existing))
            }
        }
        Err(err) => Err(err),
    }
}

/// Close the incident carrying `deduplication_key` at `ended_at`.
///
/// Closed incidents are left alone; end-time corrections go through
/// `IncidentRecord::set_ended_at` and `repo::update_incident` explicitly.
pub fn resolve_incident(
    conn: &Connection,
    deduplication_key: &str,
    ended_at: OffsetDateTime,
) -> Result<ResolveOutcome, AppError> {
    let Some(mut incident) = repo::find_by_deduplication_key(conn, deduplication_key)? else {
        tracing::debug!(deduplication_key, "No incident to resolve");
        return Ok(ResolveOutcome::NotFound);
    };
    if !incident.is_open() {
        return Ok(ResolveOutcome::AlreadyClosed(incident));
    }

    incident.set_ended_at(ended_at)?;
    repo::update_incident(conn, &incident)?;
    tracing::info!(
        id = incident.id(),
        deduplication_key,
        duration_secs = incident.duration().map(|d| d.whole_seconds()),
        "Incident resolved"
    );
    Ok(ResolveOutcome::Resolved(incident))
}
