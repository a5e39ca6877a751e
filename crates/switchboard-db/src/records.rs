//! Persistence operations for call records.
//!
//! One row per call identifier. [`save_call_record`] has overwrite semantics
//! (last write wins) so repeated finalize calls can never produce more than
//! one record for a call.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use thiserror::Error;

use switchboard_types::{AnswerValue, CallRecord, SessionStatus, TerminationReason};

/// Errors from the call-record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying SQL operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The answers column could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored status or reason label was not recognized.
    #[error("corrupt record for call {call_sid}: {detail}")]
    CorruptRecord { call_sid: String, detail: String },
}

/// Writes (or overwrites) the record for a call.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure or
/// `StoreError::Serialization` if the answers map cannot be serialized.
pub fn save_call_record(conn: &Connection, record: &CallRecord) -> Result<(), StoreError> {
    let answers_json = serde_json::to_string(&record.answers)?;

    conn.execute(
        "INSERT OR REPLACE INTO call_records
            (call_sid, answers_json, status, termination_reason, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            record.call_sid,
            answers_json,
            record.status.as_str(),
            record.termination_reason.as_str(),
        ],
    )?;

    Ok(())
}

/// Reads the record for a call, if one has been persisted.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure, or
/// `StoreError::CorruptRecord` if a stored label cannot be mapped back.
pub fn load_call_record(
    conn: &Connection,
    call_sid: &str,
) -> Result<Option<CallRecord>, StoreError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT answers_json, status, termination_reason
             FROM call_records WHERE call_sid = ?1",
            params![call_sid],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((answers_json, status, reason)) = row else {
        return Ok(None);
    };

    let answers: BTreeMap<String, AnswerValue> = serde_json::from_str(&answers_json)?;

    let status = parse_status(&status).ok_or_else(|| StoreError::CorruptRecord {
        call_sid: call_sid.to_string(),
        detail: format!("unknown status '{status}'"),
    })?;
    let termination_reason =
        parse_reason(&reason).ok_or_else(|| StoreError::CorruptRecord {
            call_sid: call_sid.to_string(),
            detail: format!("unknown termination_reason '{reason}'"),
        })?;

    Ok(Some(CallRecord {
        call_sid: call_sid.to_string(),
        answers,
        status,
        termination_reason,
    }))
}

fn parse_status(label: &str) -> Option<SessionStatus> {
    match label {
        "in_progress" => Some(SessionStatus::InProgress),
        "completed" => Some(SessionStatus::Completed),
        "terminated" => Some(SessionStatus::Terminated),
        _ => None,
    }
}

fn parse_reason(label: &str) -> Option<TerminationReason> {
    match label {
        "" => Some(TerminationReason::None),
        "completed" => Some(TerminationReason::Completed),
        "invalid_answers" => Some(TerminationReason::InvalidAnswers),
        "silence" => Some(TerminationReason::Silence),
        _ => None,
    }
}
