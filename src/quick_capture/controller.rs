// Async driver for quick capture
use std::sync::{Arc, Mutex};

use crate::credential::CredentialBroker;
use crate::error::AttendanceError;
use crate::gateway::{BackendGateway, VerificationRequest};
use crate::models::Group;
use crate::timer::{apply_effects, TimerDriven, TimerSlot, TimerToken};
use crate::utils::lock;
use crate::utils::logging::LoggingHelper;

use super::state::{CaptureFailure, QuickCaptureResult, QuickCaptureState, QuickTicket};

const FLOW: &str = "quick";

struct Inner {
    state: QuickCaptureState,
    timer: TimerSlot,
}

impl TimerDriven for Inner {
    fn timer_slot(&mut self) -> &mut TimerSlot {
        &mut self.timer
    }

    fn on_timer_elapsed(&mut self, token: TimerToken) {
        if self.state.on_timer_elapsed(token) {
            log::debug!("Quick capture result cleared");
        }
    }
}

/// Identify-and-record against a whole group in one action
pub struct QuickCaptureController {
    broker: Arc<CredentialBroker>,
    gateway: Arc<dyn BackendGateway>,
    inner: Arc<Mutex<Inner>>,
}

impl QuickCaptureController {
    #[must_use]
    pub fn new(broker: Arc<CredentialBroker>, gateway: Arc<dyn BackendGateway>) -> Self {
        Self {
            broker,
            gateway,
            inner: Arc::new(Mutex::new(Inner {
                state: QuickCaptureState::default(),
                timer: TimerSlot::new("auto-clear"),
            })),
        }
    }

    #[must_use]
    pub fn group(&self) -> Option<Group> {
        lock(&self.inner).state.group().cloned()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        lock(&self.inner).state.attempts()
    }

    #[must_use]
    pub fn result(&self) -> Option<QuickCaptureResult> {
        lock(&self.inner).state.result().cloned()
    }

    #[must_use]
    pub fn failure(&self) -> Option<CaptureFailure> {
        lock(&self.inner).state.failure().cloned()
    }

    pub fn select_group(&self, group: Group) {
        log::debug!("Quick capture group set to {}", group.id);
        let mut inner = lock(&self.inner);
        let effects = inner.state.select_group(group);
        apply_effects(&self.inner, &mut *inner, effects);
    }

    pub fn deselect_group(&self) {
        let mut inner = lock(&self.inner);
        let effects = inner.state.deselect_group();
        apply_effects(&self.inner, &mut *inner, effects);
    }

    /// Dismiss the last error and reset the attempt counter
    pub fn clear(&self) {
        lock(&self.inner).state.clear();
    }

    /// Capture a fingerprint, identify the student within the selected
    /// group and record their attendance
    ///
    /// # Errors
    ///
    /// Returns a validation error without touching the network when no group
    /// is selected, a context error when biometric capture cannot run here,
    /// and otherwise the classified ceremony, network or recognition error.
    pub async fn capture(&self) -> Result<QuickCaptureResult, AttendanceError> {
        let group = lock(&self.inner).state.require_group()?;

        let availability = self.broker.check_availability().await;
        if !availability.available && !self.broker.is_available() {
            let error = AttendanceError::Context(self.broker.unavailable_message());
            LoggingHelper::log_capture_outcome(FLOW, Err(&error));
            return Err(lock(&self.inner).state.fail_early(error));
        }

        let ticket = {
            let mut inner = lock(&self.inner);
            let (ticket, effects) = inner.state.begin(&group);
            apply_effects(&self.inner, &mut *inner, effects);
            ticket
        };

        let outcome = self.identify(&ticket).await;
        let mut inner = lock(&self.inner);
        match outcome {
            Ok(result) => {
                LoggingHelper::log_capture_outcome(FLOW, Ok(result.student.name.as_str()));
                match inner.state.succeed(&ticket, result.clone()) {
                    Some(effects) => apply_effects(&self.inner, &mut *inner, effects),
                    None => log::info!(
                        "Quick capture for group {} finished after the screen was reset",
                        ticket.group_id()
                    ),
                }
                Ok(result)
            }
            Err(e) => {
                LoggingHelper::log_capture_outcome(FLOW, Err(&e));
                inner.state.fail(&ticket, &e);
                Err(e)
            }
        }
    }

    /// Try again after a failure. The attempt counter keeps counting.
    ///
    /// # Errors
    ///
    /// Same as [`capture`](Self::capture).
    pub async fn retry(&self) -> Result<QuickCaptureResult, AttendanceError> {
        self.capture().await
    }

    async fn identify(&self, ticket: &QuickTicket) -> Result<QuickCaptureResult, AttendanceError> {
        let challenge = self
            .gateway
            .verification_challenge(ticket.group_id())
            .await?;
        let assertion = self
            .broker
            .verify_credential(&challenge.challenge, None)
            .await?;
        let outcome = self
            .gateway
            .submit_verification(&VerificationRequest {
                credential_id: assertion.credential_id,
                group_id: Some(ticket.group_id().to_string()),
            })
            .await?;

        match (outcome.found, outcome.student) {
            (true, Some(student)) => Ok(QuickCaptureResult {
                student,
                attendance: outcome.attendance,
            }),
            _ => Err(AttendanceError::NotRecognized {
                message: outcome
                    .message
                    .unwrap_or_else(|| "Fingerprint not recognized".to_string()),
                suggestions: outcome.suggestions,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CeremonyError;
    use crate::gateway::GatewayError;
    use crate::quick_capture::GENERIC_SUGGESTIONS;
    use crate::testing::constants::{INSECURE_ORIGIN, TEST_ORIGIN};
    use crate::testing::fixtures::{QuickCaptureRig, TestFixtures};
    use crate::testing::mock::ScriptedCeremony;
    use crate::timer::AUTO_CLEAR_DELAY;
    use std::time::Duration;

    fn rig(origin: &str) -> QuickCaptureRig {
        TestFixtures::quick_capture_rig(origin)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_then_auto_clear() {
        let rig = rig(TEST_ORIGIN);
        rig.controller.select_group(TestFixtures::group());
        rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
        rig.gateway.resolve_as("b", "Bruno");

        let result = rig.controller.capture().await.unwrap();
        assert_eq!(result.student.name, "Bruno");
        assert!(result.attendance.is_some());
        assert_eq!(rig.controller.attempts(), 1);
        assert!(rig.platform.last_request_options().unwrap().allow_credentials.is_none());

        tokio::time::sleep(AUTO_CLEAR_DELAY - Duration::from_millis(1)).await;
        assert!(rig.controller.result().is_some());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(rig.controller.result().is_none());
        assert_eq!(rig.controller.attempts(), 0);
    }

    #[tokio::test]
    async fn test_failure_uses_generic_suggestions_and_retry_counts() {
        let rig = rig(TEST_ORIGIN);
        rig.controller.select_group(TestFixtures::group());
        rig.platform.push(ScriptedCeremony::Cancel);
        rig.platform.push(ScriptedCeremony::Cancel);

        let err = rig.controller.capture().await.unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Ceremony(CeremonyError::UserCancelled)
        ));
        let failure = rig.controller.failure().unwrap();
        assert_eq!(failure.suggestions.len(), GENERIC_SUGGESTIONS.len());

        assert!(rig.controller.retry().await.is_err());
        assert_eq!(rig.controller.attempts(), 2);

        rig.controller.clear();
        assert!(rig.controller.failure().is_none());
        assert_eq!(rig.controller.attempts(), 0);
    }

    #[tokio::test]
    async fn test_backend_suggestions_are_shown_verbatim() {
        let rig = rig(TEST_ORIGIN);
        rig.controller.select_group(TestFixtures::group());
        rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
        rig.gateway.fail_verification(GatewayError::Rejected {
            status: 500,
            message: "Could not read the fingerprint".to_string(),
            suggestions: vec!["Dry your finger".to_string()],
        });

        let err = rig.controller.capture().await.unwrap_err();
        assert!(matches!(err, AttendanceError::Network(_)));
        let failure = rig.controller.failure().unwrap();
        assert_eq!(failure.message, "backend unavailable: Could not read the fingerprint");
        assert_eq!(failure.suggestions, vec!["Dry your finger".to_string()]);
    }

    #[tokio::test]
    async fn test_student_from_other_group_is_not_recognized() {
        let rig = rig(TEST_ORIGIN);
        rig.controller.select_group(TestFixtures::group());
        rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
        rig.gateway.resolve_outside_group();

        let err = rig.controller.capture().await.unwrap_err();
        assert_eq!(err.to_string(), "student does not belong to this group");
        assert!(rig.controller.result().is_none());
    }

    #[tokio::test]
    async fn test_insecure_context_fails_before_network() {
        let rig = rig(INSECURE_ORIGIN);
        rig.controller.select_group(TestFixtures::group());

        let err = rig.controller.capture().await.unwrap_err();
        assert!(matches!(err, AttendanceError::Context(ref m) if m.contains("http://192.168.1.50")));
        assert_eq!(rig.gateway.call_count(), 0);
        assert_eq!(rig.platform.ceremony_count(), 0);
        assert_eq!(rig.controller.attempts(), 0);
    }

    #[tokio::test]
    async fn test_switching_group_resets_counter() {
        let rig = rig(TEST_ORIGIN);
        rig.controller.select_group(TestFixtures::group());
        rig.platform.push(ScriptedCeremony::Cancel);
        let _ = rig.controller.capture().await;
        assert_eq!(rig.controller.attempts(), 1);

        rig.controller.select_group(TestFixtures::group());
        assert_eq!(rig.controller.attempts(), 0);
        assert!(rig.controller.failure().is_none());
    }
}
