//! The per-call silence watchdog.

use std::sync::Arc;
use std::time::Duration;

use switchboard_types::{SessionStatus, TerminationReason};

use crate::registry::SessionRegistry;
use crate::terminator::CallTerminator;

/// One logical cancellable timer per call.
///
/// `start` replaces any existing timer for the call. A timer that fires
/// presents its arm-time epoch to the terminator; if a prompt arrived (or a
/// newer timer was armed) in the meantime the epoch is stale and the firing
/// is a no-op. Cancelling a timer that has already fired is equally safe;
/// the finalize path is guarded by the session's terminal latch.
pub struct SilenceWatchdog {
    registry: SessionRegistry,
    terminator: Arc<CallTerminator>,
    timeout: Duration,
    spoken_message: String,
}

impl SilenceWatchdog {
    pub fn new(
        registry: SessionRegistry,
        terminator: Arc<CallTerminator>,
        timeout: Duration,
        spoken_message: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            terminator,
            timeout,
            spoken_message: spoken_message.into(),
        }
    }

    /// Arms (or re-arms) the timer for a call.
    pub async fn start(&self, call_sid: &str) {
        let Some(epoch) = self.registry.rearm_watchdog(call_sid).await else {
            tracing::debug!(call_sid = %call_sid, "not arming watchdog for missing or terminated session");
            return;
        };

        let terminator = self.terminator.clone();
        let call = call_sid.to_string();
        let timeout = self.timeout;
        let message = self.spoken_message.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            match terminator
                .finalize(
                    &call,
                    &message,
                    SessionStatus::Terminated,
                    TerminationReason::Silence,
                    Some(epoch),
                )
                .await
            {
                Ok(true) => {
                    tracing::info!(call_sid = %call, "silence watchdog terminated call");
                }
                Ok(false) => {
                    tracing::debug!(call_sid = %call, "silence watchdog fired stale; ignored");
                }
                Err(e) => {
                    tracing::error!(call_sid = %call, "silence watchdog finalize failed: {e}");
                }
            }
        });

        self.registry.attach_watchdog(call_sid, epoch, handle).await;
    }

    /// Cancels any pending timer for a call.
    pub async fn cancel(&self, call_sid: &str) {
        self.registry.cancel_watchdog(call_sid).await;
    }
}
