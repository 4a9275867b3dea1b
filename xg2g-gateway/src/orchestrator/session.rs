//! Executor state reports, heartbeats and session lookups.

use log::{info, warn};
use xg2g_protocol::SessionState;

use super::{store_error, IntentError, Orchestrator};
use crate::context::RequestContext;
use crate::lease::Reservation;
use crate::store::SessionRecord;

impl Orchestrator {
    /// Apply a lifecycle transition reported by the execution layer.
    ///
    /// `starting -> ready` counts the session (and its transcode) as active.
    /// Any move into a terminal state releases the session's leases and, if
    /// it was counted, decrements the counters again. A transcode session's
    /// end is reported to the transcoder breaker.
    pub fn report_state(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        next: SessionState,
    ) -> Result<SessionRecord, IntentError> {
        let mut previous = SessionState::Starting;
        let record = self
            .store
            .update_session(session_id, &mut |rec: &mut SessionRecord| {
                previous = rec.state;
                rec.transition(next)
            })
            .map_err(|e| store_error(ctx, "state report", e))?;

        if next == SessionState::Ready {
            self.counters.session_started();
            if record.wants_transcode() {
                self.counters.transcode_started();
            }
        } else if next.is_terminal() {
            self.settle(&record, previous);
        }

        info!(
            "[Session] {} {} {} -> {}",
            ctx.correlation_id,
            session_id,
            previous.as_str(),
            next.as_str()
        );
        Ok(record)
    }

    /// Extend the leases of a live session.
    pub fn heartbeat(&self, ctx: &RequestContext, session_id: &str) -> Result<SessionRecord, IntentError> {
        let record = self
            .store
            .get_session(session_id)
            .map_err(|e| store_error(ctx, "heartbeat lookup", e))?
            .ok_or_else(|| IntentError::NotFound(session_id.to_string()))?;
        if record.state.is_terminal() {
            return Err(IntentError::LeaseLost(session_id.to_string()));
        }

        let reservation = Reservation::for_session(&record.session_id, &record.service_ref, record.tuner_slot());
        let held = self
            .leases
            .renew(&reservation)
            .map_err(|e| store_error(ctx, "lease renewal", e))?;
        if !held {
            warn!("[Session] {} {} lost a lease", ctx.correlation_id, session_id);
            return Err(IntentError::LeaseLost(session_id.to_string()));
        }
        Ok(record)
    }

    pub fn get_session(&self, ctx: &RequestContext, session_id: &str) -> Result<SessionRecord, IntentError> {
        self.store
            .get_session(session_id)
            .map_err(|e| store_error(ctx, "session lookup", e))?
            .ok_or_else(|| IntentError::NotFound(session_id.to_string()))
    }

    pub fn list_sessions(&self, ctx: &RequestContext) -> Result<Vec<SessionRecord>, IntentError> {
        self.store
            .list_sessions()
            .map_err(|e| store_error(ctx, "session list", e))
    }
}
