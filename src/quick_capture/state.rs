//! Quick-capture state and its transitions

use crate::error::AttendanceError;
use crate::models::{AttendanceStamp, Group, ResolvedStudent};
use crate::timer::{TimerEffect, TimerToken, TimerTokens, AUTO_CLEAR_DELAY};

/// Remediation shown when the backend does not suggest anything itself
pub const GENERIC_SUGGESTIONS: [&str; 6] = [
    "The finger is not positioned correctly",
    "The sensor is dirty or wet",
    "The student is not enrolled in the system",
    "The fingerprint does not match the enrolled records",
    "Try cleaning the sensor and the finger",
    "Press the finger firmly on the sensor",
];

/// A successful identification, shown until the auto-clear fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickCaptureResult {
    pub student: ResolvedStudent,
    pub attendance: Option<AttendanceStamp>,
}

/// The last failed attempt, with what to try next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl CaptureFailure {
    fn from_error(error: &AttendanceError) -> Self {
        let suggestions = if error.suggestions().is_empty() {
            GENERIC_SUGGESTIONS.iter().map(ToString::to_string).collect()
        } else {
            error.suggestions().to_vec()
        };
        Self {
            message: error.to_string(),
            suggestions,
        }
    }
}

/// Identifies one in-flight capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickTicket {
    group_id: String,
    epoch: u64,
}

impl QuickTicket {
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// State of the quick-capture screen
#[derive(Debug, Default)]
pub struct QuickCaptureState {
    group: Option<Group>,
    attempts: u32,
    result: Option<QuickCaptureResult>,
    failure: Option<CaptureFailure>,
    pending_clear: Option<TimerToken>,
    tokens: TimerTokens,
    /// Bumped whenever the group changes or the screen is reset
    epoch: u64,
}

impl QuickCaptureState {
    #[must_use]
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn result(&self) -> Option<&QuickCaptureResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&CaptureFailure> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn pending_clear(&self) -> Option<TimerToken> {
        self.pending_clear
    }

    /// Choose the group to capture against. Previous results, errors and the
    /// attempt counter are discarded.
    pub fn select_group(&mut self, group: Group) -> Vec<TimerEffect> {
        let effects = self.reset();
        self.group = Some(group);
        effects
    }

    /// Stop capturing against any group
    pub fn deselect_group(&mut self) -> Vec<TimerEffect> {
        self.group = None;
        self.epoch += 1;
        self.cancel_pending()
    }

    /// Dismiss the error and reset the attempt counter
    pub fn clear(&mut self) {
        self.failure = None;
        self.attempts = 0;
    }

    /// The selected group, or a validation error recorded as the failure
    ///
    /// # Errors
    ///
    /// Returns a validation error if no group is selected.
    pub fn require_group(&mut self) -> Result<Group, AttendanceError> {
        if let Some(group) = &self.group {
            return Ok(group.clone());
        }
        Err(self.fail_early(AttendanceError::Validation(
            "Please select a group before capturing a fingerprint.".to_string(),
        )))
    }

    /// Record a failure that happened before an attempt started
    pub fn fail_early(&mut self, error: AttendanceError) -> AttendanceError {
        self.failure = Some(CaptureFailure::from_error(&error));
        error
    }

    /// Start an attempt: counts it and clears the previous outcome
    pub fn begin(&mut self, group: &Group) -> (QuickTicket, Vec<TimerEffect>) {
        let effects = self.cancel_pending();
        self.result = None;
        self.failure = None;
        self.attempts += 1;
        (
            QuickTicket {
                group_id: group.id.clone(),
                epoch: self.epoch,
            },
            effects,
        )
    }

    /// Show a successful identification and schedule the auto-clear.
    /// Returns `None` when the screen was reset while the capture ran.
    pub fn succeed(
        &mut self,
        ticket: &QuickTicket,
        result: QuickCaptureResult,
    ) -> Option<Vec<TimerEffect>> {
        if self.is_stale(ticket) {
            return None;
        }
        self.result = Some(result);
        let mut effects = self.cancel_pending();
        let token = self.tokens.issue();
        self.pending_clear = Some(token);
        effects.push(TimerEffect::Schedule {
            token,
            delay: AUTO_CLEAR_DELAY,
        });
        Some(effects)
    }

    /// Show a failed attempt. Stale failures are dropped.
    pub fn fail(&mut self, ticket: &QuickTicket, error: &AttendanceError) {
        if !self.is_stale(ticket) {
            self.failure = Some(CaptureFailure::from_error(error));
        }
    }

    /// A timer task woke up. Clears the result and the counter if `token` is
    /// still the pending auto-clear.
    pub fn on_timer_elapsed(&mut self, token: TimerToken) -> bool {
        if self.pending_clear != Some(token) {
            return false;
        }
        self.pending_clear = None;
        self.result = None;
        self.attempts = 0;
        true
    }

    fn is_stale(&self, ticket: &QuickTicket) -> bool {
        ticket.epoch != self.epoch
            || self.group.as_ref().map(|g| g.id.as_str()) != Some(ticket.group_id.as_str())
    }

    fn reset(&mut self) -> Vec<TimerEffect> {
        self.result = None;
        self.failure = None;
        self.attempts = 0;
        self.epoch += 1;
        self.cancel_pending()
    }

    fn cancel_pending(&mut self) -> Vec<TimerEffect> {
        self.pending_clear
            .take()
            .map(TimerEffect::Cancel)
            .into_iter()
            .collect()
    }
}
