//! PagerDuty Events v2 payloads derived from incident records.
//!
//! The deduplication key is the idempotency token PagerDuty uses to correlate a trigger with
//! its later resolve. Building a payload never mutates the record.

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::domain::IncidentRecord;
use crate::error::RecordError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Trigger,
    Resolve,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerPayload {
    pub summary: String,
    pub source: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerRequest {
    pub routing_key: String,
    pub event_action: EventAction,
    pub dedup_key: String,
    pub payload: TriggerPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveRequest {
    pub routing_key: String,
    pub event_action: EventAction,
    pub dedup_key: String,
}

pub fn trigger_request(
    incident: &IncidentRecord,
    routing_key: &str,
    summary: impl Into<String>,
    source: impl Into<String>,
    severity: Severity,
) -> TriggerRequest {
    TriggerRequest {
        routing_key: routing_key.to_string(),
        event_action: EventAction::Trigger,
        dedup_key: incident.deduplication_key().to_string(),
        payload: TriggerPayload {
            summary: summary.into(),
            source: source.into(),
            severity,
        },
    }
}

/// Resolve event for a closed incident. Open incidents have nothing to resolve yet.
pub fn resolve_request(
    incident: &IncidentRecord,
    routing_key: &str,
) -> Result<ResolveRequest, RecordError> {
    if incident.is_open() {
        return Err(RecordError::validation(
            "ended_at",
            "cannot resolve an incident that is still open",
        ));
    }
    Ok(ResolveRequest {
        routing_key: routing_key.to_string(),
        event_action: EventAction::Resolve,
        dedup_key: incident.deduplication_key().to_string(),
    })
}

/// Human-readable duration such as `1h 2m 3s`; zero-valued leading units are skipped.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.whole_seconds().max(0);
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut parts = Vec::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (minutes, "m")] {
        if value > 0 || !parts.is_empty() {
            parts.push(format!("{value}{unit}"));
        }
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// One-line summary of a resolved incident, e.g. for the resolve notification text.
pub fn resolution_summary(incident: &IncidentRecord) -> Option<String> {
    incident.duration().map(|d| {
        format!(
            "Incident {} was open for {}",
            incident.deduplication_key(),
            format_duration(d)
        )
    })
}
