//! Idempotent call finalization.

use std::sync::Arc;

use switchboard_db::DbPool;
use switchboard_telephony::CallControl;
use switchboard_types::{CallRecord, SessionStatus, TerminationReason};

use crate::registry::SessionRegistry;
use crate::SessionError;

/// Finalizes calls: latches the session, persists the outcome, and ends the
/// call through the call-control sink.
///
/// Ordering is load-bearing: the record is written *before* the sink is
/// invoked, so a sink failure can never lose the questionnaire outcome. The
/// sink failure itself is logged and swallowed; only persistence failures
/// propagate.
pub struct CallTerminator {
    registry: SessionRegistry,
    pool: DbPool,
    control: Arc<dyn CallControl>,
}

impl CallTerminator {
    pub fn new(registry: SessionRegistry, pool: DbPool, control: Arc<dyn CallControl>) -> Self {
        Self {
            registry,
            pool,
            control,
        }
    }

    /// Finalizes the call if it is still live.
    ///
    /// `only_if_epoch` is presented by the silence watchdog: a timer whose
    /// epoch has been superseded (the caller spoke, or a new timer replaced
    /// it) is stale and must not terminate the call.
    ///
    /// Returns `Ok(true)` if this invocation set the latch, `Ok(false)` for
    /// the idempotent no-op paths.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the call record could not be written. The
    /// call-control request is still attempted first so the platform ends
    /// the call either way.
    pub async fn finalize(
        &self,
        call_sid: &str,
        spoken_message: &str,
        status: SessionStatus,
        reason: TerminationReason,
        only_if_epoch: Option<u64>,
    ) -> Result<bool, SessionError> {
        let Some(answers) = self
            .registry
            .begin_finalize(call_sid, status, reason, only_if_epoch)
            .await
        else {
            tracing::debug!(call_sid = %call_sid, "finalize skipped: session missing, terminated, or stale epoch");
            return Ok(false);
        };

        let record = CallRecord {
            call_sid: call_sid.to_string(),
            answers,
            status,
            termination_reason: reason,
        };

        let persist_result = self.persist(record).await;
        if let Err(ref e) = persist_result {
            tracing::error!(call_sid = %call_sid, "call record persistence failed: {e}");
        }

        // The record (when writable) is already durable; a sink failure past
        // this point only affects how the call ends, not what we learned.
        if let Err(e) = self.control.end_call(call_sid, spoken_message).await {
            tracing::warn!(call_sid = %call_sid, "call control failed after record persisted: {e}");
        }

        persist_result.map(|()| true)
    }

    async fn persist(&self, record: CallRecord) -> Result<(), SessionError> {
        let pool = self.pool.clone();
        let call_sid = record.call_sid.clone();

        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| SessionError::StoreTask {
                call_sid: record.call_sid.clone(),
                reason: format!("pool error: {e}"),
            })?;
            switchboard_db::save_call_record(&conn, &record).map_err(|source| {
                SessionError::Store {
                    call_sid: record.call_sid.clone(),
                    source,
                }
            })
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(e) => Err(SessionError::StoreTask {
                call_sid,
                reason: format!("join error: {e}"),
            }),
        }
    }
}
