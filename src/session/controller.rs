// Async driver for the roll-call session
use std::sync::{Arc, Mutex};

use crate::confirm::{self, Confirmer};
use crate::credential::CredentialBroker;
use crate::error::AttendanceError;
use crate::gateway::{BackendGateway, VerificationRequest};
use crate::models::{Group, Student};
use crate::timer::{apply_effects, TimerDriven, TimerEffect, TimerSlot, TimerToken};
use crate::utils::lock;
use crate::utils::logging::LoggingHelper;

use super::state::{Applied, CaptureTicket, Message, Phase, SessionState};

const FLOW: &str = "roll-call";

/// What a capture did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The student was marked present
    Marked(Student),
    /// The user declined the manual capture prompt
    Declined,
    /// The session moved to another student before the result arrived
    Ignored,
}

struct Inner {
    state: SessionState,
    timer: TimerSlot,
}

impl TimerDriven for Inner {
    fn timer_slot(&mut self) -> &mut TimerSlot {
        &mut self.timer
    }

    fn on_timer_elapsed(&mut self, token: TimerToken) {
        if self.state.on_timer_elapsed(token) {
            log::debug!(
                "Auto-advanced to position {}",
                self.state.current_index() + 1
            );
        }
    }
}

/// Drives one group's roster through fingerprint capture, one student at a time
pub struct AttendanceSessionController {
    group: Group,
    broker: Arc<CredentialBroker>,
    gateway: Arc<dyn BackendGateway>,
    confirmer: Arc<dyn Confirmer>,
    inner: Arc<Mutex<Inner>>,
}

impl AttendanceSessionController {
    /// Start a session over `roster`, positioned on the first student
    ///
    /// # Errors
    ///
    /// Returns a validation error if the roster is empty.
    pub fn new(
        group: Group,
        roster: Vec<Student>,
        broker: Arc<CredentialBroker>,
        gateway: Arc<dyn BackendGateway>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Result<Self, AttendanceError> {
        let state = SessionState::new(roster)?;
        log::info!(
            "Starting roll call for group {} with {} students",
            group.id,
            state.roster().len()
        );
        Ok(Self {
            group,
            broker,
            gateway,
            confirmer,
            inner: Arc::new(Mutex::new(Inner {
                state,
                timer: TimerSlot::new("auto-advance"),
            })),
        })
    }

    #[must_use]
    pub fn group(&self) -> &Group {
        &self.group
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        lock(&self.inner).state.current_index()
    }

    #[must_use]
    pub fn current_student(&self) -> Student {
        lock(&self.inner).state.current_student().clone()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.inner).state.phase()
    }

    #[must_use]
    pub fn is_marked(&self, student_id: &str) -> bool {
        lock(&self.inner).state.is_marked(student_id)
    }

    #[must_use]
    pub fn marked_count(&self) -> usize {
        lock(&self.inner).state.marked_count()
    }

    /// Ids marked present so far, in roster order
    #[must_use]
    pub fn marked_ids(&self) -> Vec<String> {
        let inner = lock(&self.inner);
        inner
            .state
            .roster()
            .iter()
            .filter(|s| inner.state.is_marked(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }

    #[must_use]
    pub fn message(&self) -> Option<Message> {
        lock(&self.inner).state.message().cloned()
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        lock(&self.inner).state.progress()
    }

    #[must_use]
    pub fn can_capture(&self) -> bool {
        lock(&self.inner).state.can_capture()
    }

    /// Whether an auto-advance is waiting to fire
    #[must_use]
    pub fn has_pending_advance(&self) -> bool {
        lock(&self.inner).state.pending_timer().is_some()
    }

    /// Jump to the student at `index`
    ///
    /// # Errors
    ///
    /// Returns a validation error for an index outside the roster.
    pub fn select_index(&self, index: usize) -> Result<(), AttendanceError> {
        let mut inner = lock(&self.inner);
        let effects = inner.state.select_index(index)?;
        apply_effects(&self.inner, &mut *inner, effects);
        Ok(())
    }

    pub fn next(&self) {
        self.apply(SessionState::next);
    }

    pub fn previous(&self) {
        self.apply(SessionState::previous);
    }

    /// Identify the current student by fingerprint and mark them present
    ///
    /// # Errors
    ///
    /// Returns the classified ceremony, network or identity error. The roster
    /// position and marked set are left as they were before the attempt.
    pub async fn capture_by_credential(&self) -> Result<CaptureOutcome, AttendanceError> {
        let ticket = self.begin()?;
        let result = self.identify(&ticket).await;

        let mut inner = lock(&self.inner);
        let applied = match result {
            Ok((id, name)) => inner.state.apply_resolved(&ticket, &id, &name),
            Err(e) => inner.state.fail(&ticket, e),
        };
        let outcome = self.finish(&mut inner, &ticket, applied);
        log_outcome(&outcome);
        outcome
    }

    /// Mark the current student present without a fingerprint, after the
    /// user confirms
    ///
    /// # Errors
    ///
    /// Returns the network error if the backend refuses the record.
    pub async fn capture_manually(&self) -> Result<CaptureOutcome, AttendanceError> {
        let ticket = self.begin()?;
        let request = SessionState::manual_confirmation(&ticket);
        let Some(confirmed) = confirm::request(self.confirmer.as_ref(), &request).await else {
            return Ok(CaptureOutcome::Declined);
        };

        let recorded = self
            .gateway
            .record_manual_attendance(&ticket.student().id)
            .await;

        let mut inner = lock(&self.inner);
        let applied = match recorded {
            Ok(_) => Ok(inner.state.apply_manual(&ticket, confirmed)),
            Err(e) => inner.state.fail(&ticket, e.into()),
        };
        let outcome = self.finish(&mut inner, &ticket, applied);
        log_outcome(&outcome);
        outcome
    }

    /// Close the session after the user confirms the marked count.
    /// Returns `false` when the user declined.
    pub async fn finalize(&self) -> bool {
        let request = lock(&self.inner).state.finalize_confirmation();
        let Some(confirmed) = confirm::request(self.confirmer.as_ref(), &request).await else {
            return false;
        };
        self.apply(|state| state.finalize(confirmed));
        log::info!("Roll call for group {} finished", self.group.id);
        true
    }

    fn begin(&self) -> Result<CaptureTicket, AttendanceError> {
        lock(&self.inner).state.begin_capture()
    }

    /// Challenge, ceremony, identity resolution
    async fn identify(&self, ticket: &CaptureTicket) -> Result<(String, String), AttendanceError> {
        let challenge = self.gateway.verification_challenge(&self.group.id).await?;
        let allowed = challenge.credential_ids();
        let assertion = self
            .broker
            .verify_credential(&challenge.challenge, Some(allowed.as_slice()))
            .await?;

        let outcome = self
            .gateway
            .submit_verification(&VerificationRequest {
                credential_id: assertion.credential_id,
                group_id: Some(self.group.id.clone()),
            })
            .await?;

        match outcome.resolved() {
            Some(student) => Ok((student.id.clone(), student.name.clone())),
            None => {
                log::info!(
                    "No identity resolved while capturing {}: {}",
                    ticket.student().id,
                    outcome.message.as_deref().unwrap_or("no message")
                );
                Err(AttendanceError::NotRecognized {
                    message: AttendanceError::NOT_RECOGNIZED.to_string(),
                    suggestions: outcome.suggestions,
                })
            }
        }
    }

    fn finish(
        &self,
        inner: &mut Inner,
        ticket: &CaptureTicket,
        applied: Result<Applied, AttendanceError>,
    ) -> Result<CaptureOutcome, AttendanceError> {
        match applied? {
            Applied::Marked { student, effects } => {
                apply_effects(&self.inner, inner, effects);
                Ok(CaptureOutcome::Marked(student))
            }
            Applied::Stale {
                started_for,
                current,
            } => {
                debug_assert_eq!(started_for, ticket.index());
                LoggingHelper::log_stale_result(started_for, current);
                Ok(CaptureOutcome::Ignored)
            }
        }
    }

    fn apply(&self, f: impl FnOnce(&mut SessionState) -> Vec<TimerEffect>) {
        let mut inner = lock(&self.inner);
        let effects = f(&mut inner.state);
        apply_effects(&self.inner, &mut *inner, effects);
    }
}

fn log_outcome(outcome: &Result<CaptureOutcome, AttendanceError>) {
    match outcome {
        Ok(CaptureOutcome::Marked(student)) => {
            LoggingHelper::log_capture_outcome(FLOW, Ok(student.name.as_str()));
        }
        Err(e) => LoggingHelper::log_capture_outcome(FLOW, Err(e)),
        Ok(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::codec;
    use crate::error::CeremonyError;
    use crate::session::MessageKind;
    use crate::testing::fixtures::TestFixtures;
    use crate::testing::mock::{ScriptedCeremony, ScriptedConfirmer};
    use crate::timer::AUTO_ADVANCE_DELAY;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_biometric_match_marks_and_advances() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        rig.platform.push(ScriptedCeremony::Assert {
            raw_id: b"cred-a".to_vec(),
        });
        rig.gateway.resolve_as("a", "Ana");

        let outcome = rig.controller.capture_by_credential().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Marked(TestFixtures::roster()[0].clone()));
        assert_eq!(rig.controller.phase(), Phase::Captured(0));
        assert!(rig.controller.has_pending_advance());

        tokio::time::sleep(AUTO_ADVANCE_DELAY + Duration::from_millis(1)).await;
        assert_eq!(rig.controller.phase(), Phase::Browsing(1));
        assert!(!rig.controller.has_pending_advance());

        let verify = rig.gateway.verifications();
        assert_eq!(verify[0].credential_id, codec::encode(b"cred-a"));
        assert_eq!(verify[0].group_id.as_deref(), Some("g-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_navigation_cancels_advance() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        rig.controller.capture_manually().await.unwrap();
        assert!(rig.controller.has_pending_advance());

        tokio::time::sleep(Duration::from_millis(500)).await;
        rig.controller.select_index(2).unwrap();
        tokio::time::sleep(AUTO_ADVANCE_DELAY * 2).await;
        assert_eq!(rig.controller.current_index(), 2);
        assert_eq!(rig.controller.marked_ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_declined_manual_capture_makes_no_calls() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(false));
        let outcome = rig.controller.capture_manually().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Declined);
        assert_eq!(rig.gateway.call_count(), 0);
        assert_eq!(rig.controller.marked_count(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_fingerprint_keeps_state() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![7] });
        rig.gateway.resolve_nobody(&["clean the sensor"]);

        let err = rig.controller.capture_by_credential().await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotRecognized { .. }));
        assert_eq!(err.suggestions(), ["clean the sensor".to_string()]);
        assert_eq!(rig.controller.phase(), Phase::Browsing(0));
        assert_eq!(rig.controller.marked_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_ceremony_skips_identity_resolution() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        rig.platform.push(ScriptedCeremony::Cancel);

        let err = rig.controller.capture_by_credential().await.unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Ceremony(CeremonyError::UserCancelled)
        ));
        assert!(rig.gateway.verifications().is_empty());
        assert!(rig.controller.message().is_some());
    }

    #[tokio::test]
    async fn test_result_after_navigation_is_ignored() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        let gate = rig.platform.push_gated(ScriptedCeremony::Assert {
            raw_id: b"cred-a".to_vec(),
        });
        rig.gateway.resolve_as("a", "Ana");

        let controller = Arc::new(rig.controller);
        let capture = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.capture_by_credential().await })
        };
        rig.platform.wait_for_pending().await;
        controller.next();
        gate.release();

        assert_eq!(capture.await.unwrap().unwrap(), CaptureOutcome::Ignored);
        assert_eq!(controller.marked_count(), 0);
        assert_eq!(controller.current_index(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_navigation_stays_off_new_student() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        let gate = rig.platform.push_gated(ScriptedCeremony::Cancel);

        let controller = Arc::new(rig.controller);
        let capture = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.capture_by_credential().await })
        };
        rig.platform.wait_for_pending().await;
        controller.next();
        let before = controller.message();
        gate.release();

        assert_eq!(capture.await.unwrap().unwrap(), CaptureOutcome::Ignored);
        assert_eq!(controller.current_index(), 1);
        assert_eq!(controller.message(), before);
        assert!(controller
            .message()
            .map_or(true, |m| m.kind != MessageKind::Error));
    }

    #[tokio::test]
    async fn test_finalize_requires_confirmation() {
        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(false));
        assert!(!rig.controller.finalize().await);
        assert_ne!(rig.controller.phase(), Phase::Finished);

        let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
        assert!(rig.controller.finalize().await);
        assert_eq!(rig.controller.phase(), Phase::Finished);
        assert!(matches!(
            rig.controller.capture_manually().await,
            Err(AttendanceError::Validation(_))
        ));
    }
}
