//! Start and stop intents.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use xg2g_protocol::{
    IntentMode, IntentRequest, IntentResponse, IntentType, ProtocolError, SessionState, StartSessionEvent,
    StopSessionEvent, EVENT_START_SESSION, EVENT_STOP_SESSION,
};

use super::{internal, store_error, IntentError, Orchestrator};
use crate::admission::AdmissionRequest;
use crate::context::RequestContext;
use crate::events::publish_json;
use crate::lease::{LeaseError, Reservation};
use crate::metrics::IntentOutcome;
use crate::resilience::{BreakerError, CircuitBreaker, Outcome, TRANSCODER_BREAKER};
use crate::store::{SessionRecord, CTX_IDEMPOTENCY_KEY, CTX_MODE, CTX_TRANSCODE, CTX_TUNER_SLOT};

/// A successfully handled intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub response: IntentResponse,
    /// An earlier session was returned for the idempotency key.
    pub replayed: bool,
}

/// Validated start intent.
struct StartPlan<'a> {
    session_id: String,
    service_ref: &'a str,
    profile: Option<String>,
    idempotency_key: Option<String>,
    mode: IntentMode,
    wants_transcode: bool,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Orchestrator {
    /// Handle one intent. `header_key` is the `Idempotency-Key` header and
    /// wins over the body field.
    pub fn submit(
        &self,
        ctx: &RequestContext,
        header_key: Option<&str>,
        req: &IntentRequest,
    ) -> Result<Accepted, IntentError> {
        let result = match req.intent_type() {
            IntentType::StreamStart => self.start(ctx, header_key, req),
            IntentType::StreamStop => self.stop(ctx, req),
        };

        let outcome = match &result {
            Ok(accepted) if accepted.replayed => IntentOutcome::Replayed,
            Ok(_) => IntentOutcome::Accepted,
            Err(e) => e.outcome(),
        };
        self.metrics.record_intent(outcome);
        result
    }

    fn start(
        &self,
        ctx: &RequestContext,
        header_key: Option<&str>,
        req: &IntentRequest,
    ) -> Result<Accepted, IntentError> {
        let service_ref = req.service_ref.trim();
        if service_ref.is_empty() {
            return Err(IntentError::BadRequest("serviceRef is required".to_string()));
        }
        let mode = req.mode().map_err(|e| IntentError::BadRequest(e.to_string()))?;
        if mode == IntentMode::Recording {
            return Err(IntentError::BadRequest(ProtocolError::RecordingNotAdmitted.to_string()));
        }

        let idempotency_key = non_empty(header_key).or_else(|| non_empty(req.idempotency_key.as_deref()));
        if let Some(key) = &idempotency_key {
            let existing = self
                .leases
                .get_idempotency(key)
                .map_err(|e| internal(ctx, "idempotency lookup", e))?;
            if let Some(session_id) = existing {
                return self.replay(ctx, session_id);
            }
        }

        if self.config.tuner_slots.is_empty() {
            return Err(IntentError::NoTunerSlots);
        }

        let (profile, legacy) = req
            .canonical_profile()
            .map_err(|e| IntentError::BadRequest(e.to_string()))?;
        if legacy {
            info!("[Intent] {} legacy field 'profile' used", ctx.correlation_id);
        }

        let wants_transcode = req.wants_transcode();
        let admission = self.admission.check(
            &AdmissionRequest { wants_transcode },
            &self.counters.snapshot(self.config.tuner_slots.len()),
        );
        if let Some(problem) = admission.into_problem() {
            self.metrics.record_admission_rejection(problem.code);
            info!(
                "[Intent] {} rejected by admission: {}",
                ctx.correlation_id, problem.code
            );
            return Err(IntentError::Admission(problem));
        }

        let plan = StartPlan {
            session_id: new_session_id(),
            service_ref,
            profile,
            idempotency_key,
            mode,
            wants_transcode,
        };
        if !wants_transcode {
            return self.reserve_and_publish(ctx, &plan);
        }

        // The transcode's outcome arrives later through settle(); a failed
        // reservation says nothing about transcoder health.
        let breaker = self.breakers.get_or_create(TRANSCODER_BREAKER);
        breaker
            .execute(
                || self.reserve_and_publish(ctx, &plan),
                |result| result.as_ref().err().map(|_| Outcome::BusinessFailure),
            )
            .map_err(|e| match e {
                BreakerError::Open => self.breaker_open(&breaker),
                BreakerError::Inner(e) => e,
            })
    }

    fn replay(&self, ctx: &RequestContext, session_id: String) -> Result<Accepted, IntentError> {
        let correlation_id = if ctx.correlation_supplied {
            ctx.correlation_id.clone()
        } else {
            match self.store.get_session(&session_id) {
                Ok(Some(record)) => record.correlation_id,
                _ => ctx.correlation_id.clone(),
            }
        };
        info!("[Intent] {} replayed session {}", correlation_id, session_id);
        Ok(Accepted {
            response: IntentResponse::accepted(session_id, correlation_id),
            replayed: true,
        })
    }

    fn breaker_open(&self, breaker: &CircuitBreaker) -> IntentError {
        let retry_after_secs = breaker
            .retry_after_secs()
            .map(|secs| u32::try_from(secs).unwrap_or(u32::MAX).max(1))
            .unwrap_or(self.config.retry_after_secs);
        info!(
            "[Intent] {} breaker open, retry in {}s",
            breaker.name(),
            retry_after_secs
        );
        IntentError::BreakerOpen {
            name: breaker.name().to_string(),
            retry_after_secs,
        }
    }

    fn reserve_and_publish(&self, ctx: &RequestContext, plan: &StartPlan<'_>) -> Result<Accepted, IntentError> {
        let reservation = self
            .leases
            .reserve_session(&plan.session_id, plan.service_ref, &self.config.tuner_slots)
            .map_err(|e| self.lease_error(ctx, plan, e))?;

        // Leases are taken even when the client left meanwhile; give them back now.
        if ctx.is_cancelled() {
            self.leases.release_all(&reservation);
            info!(
                "[Intent] {} cancelled by client, released {} leases",
                ctx.correlation_id,
                reservation.keys.len()
            );
            return Err(IntentError::Cancelled);
        }

        let now = chrono::Utc::now().timestamp();
        let mut context = BTreeMap::new();
        context.insert(CTX_MODE.to_string(), plan.mode.as_str().to_string());
        context.insert(CTX_TRANSCODE.to_string(), plan.wants_transcode.to_string());
        if let Some(slot) = reservation.tuner_slot {
            context.insert(CTX_TUNER_SLOT.to_string(), slot.to_string());
        }
        if let Some(key) = &plan.idempotency_key {
            context.insert(CTX_IDEMPOTENCY_KEY.to_string(), key.clone());
        }
        let record = SessionRecord {
            session_id: plan.session_id.clone(),
            service_ref: plan.service_ref.to_string(),
            profile: plan.profile.clone(),
            state: SessionState::Starting,
            correlation_id: ctx.correlation_id.clone(),
            created_at: now,
            updated_at: now,
            context,
        };

        if let Err(e) = self.store.put_session(&record) {
            self.leases.release_all(&reservation);
            return Err(internal(ctx, "session persist", e));
        }

        if let Some(key) = &plan.idempotency_key {
            if let Err(e) = self.leases.put_idempotency(key, &plan.session_id) {
                warn!(
                    "[Intent] {} failed to store idempotency key for {}: {}",
                    ctx.correlation_id, plan.session_id, e
                );
            }
        }

        let event = StartSessionEvent {
            session_id: plan.session_id.clone(),
            service_ref: plan.service_ref.to_string(),
            profile_id: plan.profile.clone(),
            correlation_id: ctx.correlation_id.clone(),
            tuner_slot: reservation.tuner_slot,
            wants_transcode: plan.wants_transcode,
        };
        if let Err(e) = publish_json(self.bus.as_ref(), EVENT_START_SESSION, &event) {
            self.leases.release_all(&reservation);
            self.mark_failed(&plan.session_id);
            return Err(internal(ctx, "start event publish", e));
        }

        info!(
            "[Intent] {} accepted session {} for {} (tuner {:?}, transcode {})",
            ctx.correlation_id, plan.session_id, plan.service_ref, reservation.tuner_slot, plan.wants_transcode
        );
        Ok(Accepted {
            response: IntentResponse::accepted(plan.session_id.clone(), ctx.correlation_id.clone()),
            replayed: false,
        })
    }

    fn lease_error(&self, ctx: &RequestContext, plan: &StartPlan<'_>, err: LeaseError) -> IntentError {
        match err {
            LeaseError::Busy { key, holder } => {
                info!("[Intent] {} {} is held by {}", ctx.correlation_id, key, holder);
                IntentError::LeaseBusy {
                    retry_after_secs: self.config.retry_after_secs,
                }
            }
            LeaseError::NoTunerAvailable { slots } => {
                info!(
                    "[Intent] {} all {} tuner slots busy for {}",
                    ctx.correlation_id, slots, plan.service_ref
                );
                IntentError::LeaseBusy {
                    retry_after_secs: self.config.retry_after_secs,
                }
            }
            LeaseError::Store(e) => internal(ctx, "lease acquisition", e),
        }
    }

    fn mark_failed(&self, session_id: &str) {
        let result = self
            .store
            .update_session(session_id, &mut |rec: &mut SessionRecord| rec.transition(SessionState::Failed));
        if let Err(e) = result {
            warn!("[Intent] Failed to mark session {} failed: {}", session_id, e);
        }
    }

    fn stop(&self, ctx: &RequestContext, req: &IntentRequest) -> Result<Accepted, IntentError> {
        let session_id = non_empty(req.session_id.as_deref())
            .ok_or_else(|| IntentError::BadRequest("sessionID is required for stream.stop".to_string()))?;

        let mut previous = SessionState::Starting;
        let record = self
            .store
            .update_session(&session_id, &mut |rec: &mut SessionRecord| {
                previous = rec.state;
                if rec.state.is_terminal() {
                    return Ok(());
                }
                rec.transition(SessionState::Cancelled)
            })
            .map_err(|e| store_error(ctx, "session stop", e))?;

        if previous.is_terminal() {
            debug!(
                "[Intent] {} stop for already {} session {}",
                ctx.correlation_id,
                previous.as_str(),
                session_id
            );
        } else {
            self.settle(&record, previous);
            let event = StopSessionEvent {
                session_id: session_id.clone(),
                correlation_id: ctx.correlation_id.clone(),
                reason: "client_stop".to_string(),
            };
            if let Err(e) = publish_json(self.bus.as_ref(), EVENT_STOP_SESSION, &event) {
                warn!("[Intent] {} stop event for {} not delivered: {}", ctx.correlation_id, session_id, e);
            }
            info!("[Intent] {} stopped session {}", ctx.correlation_id, session_id);
        }

        Ok(Accepted {
            response: IntentResponse::accepted(session_id, ctx.correlation_id.clone()),
            replayed: false,
        })
    }

    /// Release capacity of a session that just became terminal and report
    /// a transcode's outcome to the transcoder breaker.
    pub(super) fn settle(&self, record: &SessionRecord, previous: SessionState) {
        if previous == SessionState::Ready {
            self.counters.session_ended();
            if record.wants_transcode() {
                self.counters.transcode_ended();
            }
        }
        if record.wants_transcode() {
            let outcome = match record.state {
                SessionState::Failed => Outcome::TechnicalFailure,
                _ => Outcome::Success,
            };
            debug!(
                "[Intent] transcode session {} settled as {:?}",
                record.session_id, outcome
            );
            self.breakers.get_or_create(TRANSCODER_BREAKER).record(outcome);
        }
        self.leases.release_all(&Reservation::for_session(
            &record.session_id,
            &record.service_ref,
            record.tuner_slot(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{harness, harness_with};
    use super::*;
    use crate::admission::AdmissionLimits;
    use crate::resilience::{BreakerConfig, BreakerState};
    use crate::store::StateStore;
    use xg2g_protocol::ProblemCode;

    fn live(service_ref: &str) -> IntentRequest {
        IntentRequest {
            service_ref: service_ref.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_publishes_and_persists() {
        let h = harness();
        let mut rx = h.bus.subscribe();
        let ctx = RequestContext::with_correlation_id("corr-1");

        let accepted = h.orchestrator.submit(&ctx, None, &live("ref-a")).unwrap();
        assert!(!accepted.replayed);
        assert_eq!(accepted.response.status, "accepted");
        assert_eq!(accepted.response.correlation_id, "corr-1");

        let session_id = accepted.response.session_id;
        let record = h.store.get_session(&session_id).unwrap().unwrap();
        assert_eq!(record.state, SessionState::Starting);
        assert_eq!(record.tuner_slot(), Some(0));
        assert_eq!(record.context.get(CTX_MODE).map(String::as_str), Some("live"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.topic, EVENT_START_SESSION);
        assert_eq!(event.payload["sessionId"], session_id.as_str());
        assert_eq!(event.payload["tunerSlot"], 0);
        assert_eq!(h.metrics.intent_counts().accepted, 1);
    }

    #[test]
    fn test_validation() {
        let h = harness();
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();

        let err = h.orchestrator.submit(&ctx, None, &live("  ")).unwrap_err();
        assert_eq!(err.status(), 400);

        let mut req = live("ref");
        req.params.insert("mode".into(), "recording".into());
        assert_eq!(h.orchestrator.submit(&ctx, None, &req).unwrap_err().status(), 400);

        req.params.insert("mode".into(), "timeshift".into());
        assert_eq!(h.orchestrator.submit(&ctx, None, &req).unwrap_err().status(), 400);

        let mut req = live("ref");
        req.profile_id = Some("hd".into());
        req.profile = Some("sd".into());
        assert_eq!(h.orchestrator.submit(&ctx, None, &req).unwrap_err().status(), 400);
        assert_eq!(h.metrics.intent_counts().bad_request, 4);
    }

    #[test]
    fn test_idempotent_replay() {
        let h = harness();
        let _rx = h.bus.subscribe();
        let mut req = live("ref-a");
        req.idempotency_key = Some("body-key".into());

        let first = h
            .orchestrator
            .submit(&RequestContext::with_correlation_id("c1"), Some("header-key"), &req)
            .unwrap();
        let again = h
            .orchestrator
            .submit(&RequestContext::new(), Some("header-key"), &req)
            .unwrap();

        assert!(again.replayed);
        assert_eq!(again.response.session_id, first.response.session_id);
        // No correlation ID supplied: the original one is returned.
        assert_eq!(again.response.correlation_id, "c1");
        assert_eq!(h.store.list_sessions().unwrap().len(), 1);

        // The body key was shadowed by the header and never stored.
        let other = h.orchestrator.submit(&RequestContext::new(), None, &req).unwrap_err();
        assert!(matches!(other, IntentError::LeaseBusy { retry_after_secs: 1 }));
        assert_eq!(h.metrics.intent_counts().replayed, 1);
    }

    #[test]
    fn test_dedup_and_tuner_exhaustion_conflict() {
        let h = harness();
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();

        h.orchestrator.submit(&ctx, None, &live("ref-a")).unwrap();
        let dup = h.orchestrator.submit(&ctx, None, &live("ref-a")).unwrap_err();
        assert!(matches!(dup, IntentError::LeaseBusy { .. }));

        h.orchestrator.submit(&ctx, None, &live("ref-b")).unwrap();
        let full = h.orchestrator.submit(&ctx, None, &live("ref-c")).unwrap_err();
        assert_eq!(full.status(), 409);

        // The failed attempt for ref-c left no dedup lease behind.
        let (_, acquired) = h
            .store
            .try_acquire_lease("service:ref-c", "someone", std::time::Duration::from_secs(5))
            .unwrap();
        assert!(acquired);
    }

    #[test]
    fn test_no_tuner_slots_configured() {
        let h = harness_with(AdmissionLimits::default(), Vec::new(), BreakerConfig::default());
        let err = h
            .orchestrator
            .submit(&RequestContext::new(), None, &live("ref"))
            .unwrap_err();
        assert!(matches!(err, IntentError::NoTunerSlots));
        assert_eq!(err.status(), 503);
    }

    #[test]
    fn test_admission_rejection_is_counted() {
        let limits = AdmissionLimits {
            engine_enabled: false,
            ..Default::default()
        };
        let h = harness_with(limits, vec![0], BreakerConfig::default());
        let err = h
            .orchestrator
            .submit(&RequestContext::new(), None, &live("ref"))
            .unwrap_err();
        match err {
            IntentError::Admission(problem) => assert_eq!(problem.code, ProblemCode::EngineDisabled),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.metrics.admission_rejections(ProblemCode::EngineDisabled), 1);
        assert_eq!(h.metrics.intent_counts().rejected, 1);
    }

    #[test]
    fn test_open_transcoder_breaker_blocks_transcodes_only() {
        let h = harness_with(
            AdmissionLimits::default(),
            vec![0, 1],
            BreakerConfig {
                consecutive_failures: 1,
                ..Default::default()
            },
        );
        let _rx = h.bus.subscribe();
        h.breakers.get_or_create(TRANSCODER_BREAKER).record_technical_failure();
        assert_eq!(h.breakers.get_or_create(TRANSCODER_BREAKER).state(), BreakerState::Open);

        let mut req = live("ref-a");
        req.params.insert("transcode".into(), "true".into());
        match h.orchestrator.submit(&RequestContext::new(), None, &req).unwrap_err() {
            IntentError::BreakerOpen { retry_after_secs, .. } => assert!(retry_after_secs >= 1),
            other => panic!("unexpected {:?}", other),
        }

        assert!(h.orchestrator.submit(&RequestContext::new(), None, &live("ref-a")).is_ok());
    }

    fn transcode(service_ref: &str) -> IntentRequest {
        let mut req = live(service_ref);
        req.params.insert("transcode".into(), "true".into());
        req
    }

    fn stop_request(session_id: &str) -> IntentRequest {
        IntentRequest {
            intent_type: Some(IntentType::StreamStop),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_breaker_retry_after_rounds_up() {
        let h = harness_with(
            AdmissionLimits::default(),
            vec![0],
            BreakerConfig {
                consecutive_failures: 1,
                ..Default::default()
            },
        );
        h.breakers.get_or_create(TRANSCODER_BREAKER).record_technical_failure();
        h.clock.advance(std::time::Duration::from_millis(10_500));

        match h.orchestrator.submit(&RequestContext::new(), None, &transcode("ref-a")).unwrap_err() {
            IntentError::BreakerOpen { retry_after_secs, .. } => assert_eq!(retry_after_secs, 20),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stopped_transcode_closes_half_open_breaker() {
        let h = harness_with(
            AdmissionLimits::default(),
            vec![0, 1],
            BreakerConfig {
                consecutive_failures: 1,
                half_open_successes: 1,
                ..Default::default()
            },
        );
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();
        let breaker = h.breakers.get_or_create(TRANSCODER_BREAKER);
        breaker.record_technical_failure();
        h.clock.advance(std::time::Duration::from_secs(30));

        let first = h.orchestrator.submit(&ctx, None, &transcode("ref-a")).unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // The half-open slot is held until the first transcode settles.
        let busy = h.orchestrator.submit(&ctx, None, &transcode("ref-b")).unwrap_err();
        assert!(matches!(busy, IntentError::BreakerOpen { .. }));

        h.orchestrator
            .submit(&ctx, None, &stop_request(&first.response.session_id))
            .unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(h.orchestrator.submit(&ctx, None, &transcode("ref-b")).is_ok());
    }

    #[test]
    fn test_failed_transcode_reopens_breaker() {
        let h = harness_with(
            AdmissionLimits::default(),
            vec![0, 1],
            BreakerConfig {
                consecutive_failures: 1,
                half_open_successes: 1,
                ..Default::default()
            },
        );
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();
        let breaker = h.breakers.get_or_create(TRANSCODER_BREAKER);
        breaker.record_technical_failure();
        h.clock.advance(std::time::Duration::from_secs(30));

        let first = h.orchestrator.submit(&ctx, None, &transcode("ref-a")).unwrap();
        h.orchestrator
            .report_state(&ctx, &first.response.session_id, SessionState::Failed)
            .unwrap();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Live sessions never feed the transcoder breaker.
        let live_session = h.orchestrator.submit(&ctx, None, &live("ref-b")).unwrap();
        h.orchestrator
            .report_state(&ctx, &live_session.response.session_id, SessionState::Failed)
            .unwrap();
        assert_eq!(breaker.snapshot().failures, 2);
    }

    #[test]
    fn test_failed_reservation_returns_half_open_slot() {
        let h = harness_with(
            AdmissionLimits::default(),
            vec![0, 1],
            BreakerConfig {
                consecutive_failures: 1,
                half_open_successes: 1,
                ..Default::default()
            },
        );
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();
        h.orchestrator.submit(&ctx, None, &live("ref-a")).unwrap();
        let breaker = h.breakers.get_or_create(TRANSCODER_BREAKER);
        breaker.record_technical_failure();
        h.clock.advance(std::time::Duration::from_secs(30));

        // ref-a is taken, the dedup conflict must not keep the half-open slot.
        let dup = h.orchestrator.submit(&ctx, None, &transcode("ref-a")).unwrap_err();
        assert!(matches!(dup, IntentError::LeaseBusy { .. }));
        assert!(h.orchestrator.submit(&ctx, None, &transcode("ref-b")).is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_publish_failure_releases_leases() {
        let h = harness();
        // No subscriber: publishing fails.
        let err = h
            .orchestrator
            .submit(&RequestContext::new(), None, &live("ref-a"))
            .unwrap_err();
        assert_eq!(err.status(), 500);

        let sessions = h.store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, SessionState::Failed);
        let (_, acquired) = h
            .store
            .try_acquire_lease("tuner:0", "someone", std::time::Duration::from_secs(5))
            .unwrap();
        assert!(acquired);
    }

    #[test]
    fn test_cancelled_client_releases_leases() {
        let h = harness();
        let _rx = h.bus.subscribe();
        let ctx = RequestContext::new();
        ctx.cancel.cancel();

        let err = h.orchestrator.submit(&ctx, None, &live("ref-a")).unwrap_err();
        assert!(matches!(err, IntentError::Cancelled));
        assert!(h.store.list_sessions().unwrap().is_empty());
        let (_, acquired) = h
            .store
            .try_acquire_lease("service:ref-a", "someone", std::time::Duration::from_secs(5))
            .unwrap();
        assert!(acquired);
    }

    #[test]
    fn test_stop_intent() {
        let h = harness();
        let mut rx = h.bus.subscribe();
        let ctx = RequestContext::new();
        let session_id = h
            .orchestrator
            .submit(&ctx, None, &live("ref-a"))
            .unwrap()
            .response
            .session_id;
        let _ = rx.try_recv();

        let stop = IntentRequest {
            intent_type: Some(IntentType::StreamStop),
            session_id: Some(session_id.clone()),
            ..Default::default()
        };
        h.orchestrator.submit(&ctx, None, &stop).unwrap();
        assert_eq!(
            h.store.get_session(&session_id).unwrap().unwrap().state,
            SessionState::Cancelled
        );
        assert_eq!(rx.try_recv().unwrap().topic, EVENT_STOP_SESSION);

        // Leases are free again, stopping twice is harmless.
        assert!(h.orchestrator.submit(&ctx, None, &live("ref-a")).is_ok());
        assert!(h.orchestrator.submit(&ctx, None, &stop).is_ok());

        let unknown = IntentRequest {
            intent_type: Some(IntentType::StreamStop),
            session_id: Some("nope".into()),
            ..Default::default()
        };
        assert_eq!(h.orchestrator.submit(&ctx, None, &unknown).unwrap_err().status(), 404);
    }
}
