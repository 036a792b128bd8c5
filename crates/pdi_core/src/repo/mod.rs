use rusqlite::types::{ToSql, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::domain::{IncidentRecord, RecordKey};
use crate::error::AppError;
use crate::row::{format_timestamp, parse_timestamp, Column, FieldValue, IncidentRow};
use crate::schema::{SemanticType, PAGERDUTY_INCIDENT};
use crate::validate::validate_record;

pub const CODE_DEDUP_KEY_CONFLICT: &str = "INCIDENT_DEDUP_KEY_CONFLICT";
pub const CODE_ALREADY_PERSISTED: &str = "INCIDENT_ALREADY_PERSISTED";
pub const CODE_STILL_OPEN: &str = "INCIDENT_STILL_OPEN";

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Int(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            FieldValue::Timestamp(ts) => ToSqlOutput::Owned(Value::Text(
                format_timestamp(*ts)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            )),
        })
    }
}

fn read_field(row: &rusqlite::Row<'_>, column: Column) -> rusqlite::Result<FieldValue> {
    let idx = column.position();
    match column.descriptor().semantic_type {
        SemanticType::Integer32 => Ok(FieldValue::from(row.get::<_, Option<i32>>(idx)?)),
        SemanticType::Text => Ok(row
            .get::<_, Option<String>>(idx)?
            .map(FieldValue::Text)
            .unwrap_or(FieldValue::Null)),
        SemanticType::TimestampWithOffset => match row.get::<_, Option<String>>(idx)? {
            None => Ok(FieldValue::Null),
            Some(raw) => parse_timestamp(&raw)
                .map(FieldValue::Timestamp)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
                }),
        },
    }
}

fn read_values(row: &rusqlite::Row<'_>) -> rusqlite::Result<[FieldValue; 6]> {
    Ok([
        read_field(row, Column::Id)?,
        read_field(row, Column::UptimeEventId)?,
        read_field(row, Column::SslEventId)?,
        read_field(row, Column::DeduplicationKey)?,
        read_field(row, Column::StartedAt)?,
        read_field(row, Column::EndedAt)?,
    ])
}

fn decode(values: [FieldValue; 6]) -> Result<IncidentRecord, AppError> {
    let row = IncidentRow::from_values(values).map_err(|e| {
        AppError::new("DB_ROW_INVALID", "Stored incident row does not match the schema")
            .with_details(e.to_string())
    })?;
    IncidentRecord::from_row(row).map_err(|e| {
        AppError::new("DB_ROW_INVALID", "Stored incident row violates record rules")
            .with_details(e.to_string())
    })
}

fn select_sql(filter: &str) -> String {
    format!(
        "SELECT {} FROM {} {filter}",
        PAGERDUTY_INCIDENT.column_list(),
        PAGERDUTY_INCIDENT.name
    )
}

fn query_incidents(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<IncidentRecord>, AppError> {
    let sql = select_sql(filter);
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to prepare incidents query")
            .with_details(e.to_string())
    })?;

    let rows = stmt.query_map(params, read_values).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to query incidents").with_details(e.to_string())
    })?;

    let mut out = Vec::new();
    for r in rows {
        let values = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode incident row")
                .with_details(e.to_string())
        })?;
        out.push(decode(values)?);
    }
    Ok(out)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Persist a detached record and return it attached to its generated id.
///
/// A duplicate deduplication key surfaces as `INCIDENT_DEDUP_KEY_CONFLICT`; callers decide what
/// that means (see `lifecycle::open_incident`).
pub fn insert_incident(
    conn: &Connection,
    record: &IncidentRecord,
) -> Result<IncidentRecord, AppError> {
    if let Some(id) = record.id() {
        return Err(AppError::new(
            CODE_ALREADY_PERSISTED,
            "Incident already has a persisted identity",
        )
        .with_details(format!("id={id}")));
    }
    validate_record(record)?;

    let (names, params): (Vec<&str>, Vec<FieldValue>) = Column::ALL
        .into_iter()
        .zip(record.to_row().into_values())
        .filter(|(column, _)| !column.descriptor().identity)
        .map(|(column, value)| (column.name(), value))
        .unzip();
    let placeholders = (1..=names.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        PAGERDUTY_INCIDENT.name,
        names.join(", ")
    );

    conn.execute(&sql, params_from_iter(params.iter()))
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::new(
                    CODE_DEDUP_KEY_CONFLICT,
                    "An incident with this deduplication key already exists",
                )
                .with_details(format!("deduplication_key={}", record.deduplication_key()))
            } else {
                AppError::new("DB_INSERT_FAILED", "Failed to insert incident")
                    .with_details(e.to_string())
                    .with_retryable(true)
            }
        })?;

    let rowid = conn.last_insert_rowid();
    let id = i32::try_from(rowid).map_err(|_| {
        AppError::new("DB_ID_OUT_OF_RANGE", "Generated incident id does not fit in i32")
            .with_details(format!("rowid={rowid}"))
    })?;

    let mut persisted = record.clone();
    persisted.attach(id)?;
    tracing::debug!(
        id,
        deduplication_key = %persisted.deduplication_key(),
        "Inserted incident"
    );
    Ok(persisted)
}

/// Persist the end time of a closed incident (closing it, or correcting its end time).
///
/// Only `ended_at` is written, and never as NULL, so a stale open copy cannot reopen a row.
pub fn update_incident(conn: &Connection, record: &IncidentRecord) -> Result<(), AppError> {
    let key = record.key()?;
    validate_record(record)?;
    let Some(ended_at) = record.ended_at() else {
        return Err(AppError::new(
            CODE_STILL_OPEN,
            "Open incidents have no end time to persist",
        )
        .with_details(format!("id={key}")));
    };

    let sql = format!(
        "UPDATE {} SET {} = ?1 WHERE id = ?2 AND ?1 IS NOT NULL",
        PAGERDUTY_INCIDENT.name,
        Column::EndedAt.name()
    );
    let changed = conn
        .execute(
            &sql,
            [&FieldValue::Timestamp(ended_at) as &dyn ToSql, &key.0],
        )
        .map_err(|e| {
            AppError::new("DB_UPDATE_FAILED", "Failed to update incident")
                .with_details(e.to_string())
        })?;

    if changed == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Incident not found")
            .with_details(format!("id={key}")));
    }
    tracing::debug!(id = key.0, %ended_at, "Updated incident end time");
    Ok(())
}

pub fn get_incident(conn: &Connection, key: RecordKey) -> Result<IncidentRecord, AppError> {
    query_incidents(conn, "WHERE id = ?1", &[&key.0 as &dyn ToSql])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::new("DB_NOT_FOUND", "Incident not found").with_details(format!("id={key}"))
        })
}

pub fn find_by_deduplication_key(
    conn: &Connection,
    deduplication_key: &str,
) -> Result<Option<IncidentRecord>, AppError> {
    let found = query_incidents(
        conn,
        "WHERE deduplication_key = ?1",
        &[&deduplication_key as &dyn ToSql],
    )?;
    Ok(found.into_iter().next())
}

pub fn find_by_uptime_event(
    conn: &Connection,
    uptime_event_id: i32,
) -> Result<Vec<IncidentRecord>, AppError> {
    query_incidents(
        conn,
        "WHERE uptime_event_id = ?1 ORDER BY started_at ASC, id ASC",
        &[&uptime_event_id as &dyn ToSql],
    )
}

pub fn find_by_ssl_event(
    conn: &Connection,
    ssl_event_id: i32,
) -> Result<Vec<IncidentRecord>, AppError> {
    query_incidents(
        conn,
        "WHERE ssl_event_id = ?1 ORDER BY started_at ASC, id ASC",
        &[&ssl_event_id as &dyn ToSql],
    )
}

pub fn list_open_incidents(conn: &Connection) -> Result<Vec<IncidentRecord>, AppError> {
    query_incidents(
        conn,
        "WHERE ended_at IS NULL ORDER BY started_at ASC, id ASC",
        &[],
    )
}

pub fn count_incidents(conn: &Connection) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM {}", PAGERDUTY_INCIDENT.name);
    conn.query_row(&sql, [], |row| row.get(0)).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to count incidents").with_details(e.to_string())
    })
}

/// Whether any row uses `deduplication_key`, without decoding it.
pub fn deduplication_key_exists(
    conn: &Connection,
    deduplication_key: &str,
) -> Result<bool, AppError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE deduplication_key = ?1",
        PAGERDUTY_INCIDENT.name
    );
    conn.query_row(&sql, [deduplication_key], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to look up deduplication key")
                .with_details(e.to_string())
        })
}
