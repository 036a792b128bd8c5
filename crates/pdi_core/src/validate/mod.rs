use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::IncidentRecord;
use crate::error::RecordError;
use crate::schema::PAGERDUTY_INCIDENT;

/// Where a staged change sits in the validation flow.
///
/// `Unvalidated -> Valid` when every rule passes, `Unvalidated -> Rejected` otherwise.
/// `Rejected` is terminal: the change can never be committed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    Unvalidated,
    Valid,
    Rejected,
}

/// A candidate copy of a record with one mutation applied.
///
/// Mutators build one of these, validate it, and only then swap it into the live record,
/// so a rejected change never leaves the record partially mutated.
#[derive(Debug, Clone)]
pub struct StagedChange {
    candidate: IncidentRecord,
    state: ValidationState,
    rejection: Option<RecordError>,
}

impl StagedChange {
    pub fn new(current: &IncidentRecord, apply: impl FnOnce(&mut IncidentRecord)) -> Self {
        let mut candidate = current.clone();
        apply(&mut candidate);
        Self::from_candidate(candidate)
    }

    pub fn from_candidate(candidate: IncidentRecord) -> Self {
        Self {
            candidate,
            state: ValidationState::Unvalidated,
            rejection: None,
        }
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn candidate(&self) -> &IncidentRecord {
        &self.candidate
    }

    pub fn validate(&mut self) -> Result<(), RecordError> {
        match self.state {
            ValidationState::Valid => Ok(()),
            ValidationState::Rejected => Err(self.rejection.clone().unwrap_or_else(|| {
                RecordError::IllegalState("staged change was already rejected".to_string())
            })),
            ValidationState::Unvalidated => match validate_record(&self.candidate) {
                Ok(()) => {
                    self.state = ValidationState::Valid;
                    Ok(())
                }
                Err(err) => {
                    self.state = ValidationState::Rejected;
                    self.rejection = Some(err.clone());
                    Err(err)
                }
            },
        }
    }

    /// Validate (if not done yet) and hand back the candidate.
    pub fn into_valid(mut self) -> Result<IncidentRecord, RecordError> {
        self.validate()?;
        Ok(self.candidate)
    }

    /// Replace `target` with the candidate. On rejection `target` is left untouched.
    pub fn commit(self, target: &mut IncidentRecord) -> Result<(), RecordError> {
        *target = self.into_valid()?;
        Ok(())
    }
}

/// Non-empty text bounded by the column's declared `max_length` (counted in characters).
pub fn check_required_text(column: &'static str, value: &str) -> Result<(), RecordError> {
    let Some(descriptor) = PAGERDUTY_INCIDENT.column(column) else {
        return Err(RecordError::IllegalState(format!(
            "unknown column {column} in {}",
            PAGERDUTY_INCIDENT.name
        )));
    };
    if value.is_empty() {
        return Err(RecordError::validation(descriptor.name, "must not be empty"));
    }
    if let Some(max) = descriptor.max_length {
        let len = value.chars().count();
        if len > max {
            return Err(RecordError::validation(
                descriptor.name,
                format!("length {len} exceeds maximum of {max}"),
            ));
        }
    }
    Ok(())
}

pub fn check_time_order(
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
) -> Result<(), RecordError> {
    let Some(ended_at) = ended_at else {
        return Ok(());
    };
    if ended_at < started_at {
        return Err(RecordError::validation(
            "ended_at",
            format!("ended_at={ended_at} is earlier than started_at={started_at}"),
        ));
    }
    Ok(())
}

/// Every rule a record must satisfy before it is handed to storage.
pub fn validate_record(record: &IncidentRecord) -> Result<(), RecordError> {
    check_required_text("deduplication_key", record.deduplication_key())?;
    check_time_order(record.started_at(), record.ended_at())?;
    Ok(())
}
