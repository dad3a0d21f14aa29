//! Roll-call session state and its transitions
//!
//! Every operation is a synchronous transition over [`SessionState`] that
//! returns the timer effects the driver must perform. Nothing here awaits,
//! spawns or talks to the network.

use std::collections::HashSet;

use crate::confirm::{ConfirmationRequest, Confirmed};
use crate::error::AttendanceError;
use crate::models::{AttendanceMethod, Student};
use crate::timer::{TimerEffect, TimerToken, TimerTokens, AUTO_ADVANCE_DELAY};

/// Where the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Looking at the student at this index
    Browsing(usize),
    /// The student at this index was just marked; auto-advance is pending
    Captured(usize),
    /// Attendance taking is closed
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

/// Transient feedback shown next to the current student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Snapshot taken when a capture starts. A result is applied only while the
/// session is still on the same student it started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTicket {
    index: usize,
    epoch: u64,
    student: Student,
}

impl CaptureTicket {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn student(&self) -> &Student {
        &self.student
    }
}

/// Result of applying a capture to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The student was marked and auto-advance was scheduled
    Marked {
        student: Student,
        effects: Vec<TimerEffect>,
    },
    /// The session moved on while the capture was running; nothing changed
    Stale { started_for: usize, current: usize },
}

const ALREADY_MARKED: &str = "This student already has attendance recorded";

/// State of one roll-call session over a fixed roster
#[derive(Debug)]
pub struct SessionState {
    roster: Vec<Student>,
    current: usize,
    marked: HashSet<String>,
    captured: bool,
    finished: bool,
    pending_timer: Option<TimerToken>,
    tokens: TimerTokens,
    /// Bumped on every change of the current student
    epoch: u64,
    message: Option<Message>,
}

impl SessionState {
    /// Start a session at the first student of `roster`
    ///
    /// # Errors
    ///
    /// Returns a validation error if the roster is empty.
    pub fn new(roster: Vec<Student>) -> Result<Self, AttendanceError> {
        if roster.is_empty() {
            return Err(AttendanceError::Validation(
                "There are no students in this group.".to_string(),
            ));
        }
        Ok(Self {
            roster,
            current: 0,
            marked: HashSet::new(),
            captured: false,
            finished: false,
            pending_timer: None,
            tokens: TimerTokens::default(),
            epoch: 0,
            message: None,
        })
    }

    #[must_use]
    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_student(&self) -> &Student {
        &self.roster[self.current]
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.finished {
            Phase::Finished
        } else if self.captured {
            Phase::Captured(self.current)
        } else {
            Phase::Browsing(self.current)
        }
    }

    #[must_use]
    pub fn is_marked(&self, student_id: &str) -> bool {
        self.marked.contains(student_id)
    }

    #[must_use]
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    #[must_use]
    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.pending_timer
    }

    /// Fraction of the roster reached, `1/len` at the first student and `1`
    /// at the last
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        (self.current + 1) as f64 / self.roster.len() as f64
    }

    /// The current student can still be captured
    #[must_use]
    pub fn can_capture(&self) -> bool {
        !self.finished && !self.is_marked(&self.current_student().id)
    }

    /// Jump to the student at `index`
    ///
    /// # Errors
    ///
    /// Returns a validation error if `index` is outside the roster or the
    /// session is finished.
    pub fn select_index(&mut self, index: usize) -> Result<Vec<TimerEffect>, AttendanceError> {
        self.ensure_open()?;
        if index >= self.roster.len() {
            return Err(AttendanceError::Validation(format!(
                "No student at position {} of {}.",
                index + 1,
                self.roster.len()
            )));
        }
        Ok(self.move_to(index))
    }

    /// Move to the next student; nothing happens at the end of the roster
    pub fn next(&mut self) -> Vec<TimerEffect> {
        if self.finished || self.current + 1 >= self.roster.len() {
            return Vec::new();
        }
        self.move_to(self.current + 1)
    }

    /// Move to the previous student; nothing happens at the start
    pub fn previous(&mut self) -> Vec<TimerEffect> {
        if self.finished || self.current == 0 {
            return Vec::new();
        }
        self.move_to(self.current - 1)
    }

    /// Start a capture for the current student
    ///
    /// # Errors
    ///
    /// Returns a validation error if the session is finished or the current
    /// student is already marked.
    pub fn begin_capture(&mut self) -> Result<CaptureTicket, AttendanceError> {
        self.ensure_open()?;
        let student = self.current_student().clone();
        if self.is_marked(&student.id) {
            return Err(AttendanceError::Validation(format!(
                "Attendance for {} is already recorded.",
                student.name
            )));
        }
        self.message = None;
        Ok(CaptureTicket {
            index: self.current,
            epoch: self.epoch,
            student,
        })
    }

    /// The confirmation to show before a manual capture
    #[must_use]
    pub fn manual_confirmation(ticket: &CaptureTicket) -> ConfirmationRequest {
        ConfirmationRequest::ManualAttendance {
            student: ticket.student.clone(),
        }
    }

    /// Apply an identity resolved from a fingerprint
    ///
    /// # Errors
    ///
    /// Returns `IdentityMismatch` when the fingerprint belongs to somebody
    /// else. The roster position and marked set are left untouched.
    pub fn apply_resolved(
        &mut self,
        ticket: &CaptureTicket,
        resolved_id: &str,
        resolved_name: &str,
    ) -> Result<Applied, AttendanceError> {
        if let Some(stale) = self.stale(ticket) {
            return Ok(stale);
        }
        if resolved_id != ticket.student.id {
            return self.fail(
                ticket,
                AttendanceError::IdentityMismatch(resolved_name.to_string()),
            );
        }
        Ok(self.mark(ticket, AttendanceMethod::Biometric))
    }

    /// Apply a manual attendance the user confirmed
    pub fn apply_manual(&mut self, ticket: &CaptureTicket, _confirmed: Confirmed) -> Applied {
        match self.stale(ticket) {
            Some(stale) => stale,
            None => self.mark(ticket, AttendanceMethod::Manual),
        }
    }

    /// Record a failed attempt. Only the transient message changes, and
    /// only while the session is still on the ticket's student.
    ///
    /// # Errors
    ///
    /// Returns `error` unless the session has moved on.
    pub fn fail(
        &mut self,
        ticket: &CaptureTicket,
        error: AttendanceError,
    ) -> Result<Applied, AttendanceError> {
        if let Some(stale) = self.stale(ticket) {
            return Ok(stale);
        }
        self.message = Some(Message::new(MessageKind::Error, error.to_string()));
        Err(error)
    }

    /// The confirmation to show before finishing
    #[must_use]
    pub fn finalize_confirmation(&self) -> ConfirmationRequest {
        ConfirmationRequest::Finalize {
            marked: self.marked.len(),
            total: self.roster.len(),
        }
    }

    /// Close the session
    pub fn finalize(&mut self, _confirmed: Confirmed) -> Vec<TimerEffect> {
        let effects = self.cancel_pending();
        self.finished = true;
        self.captured = false;
        self.message = None;
        effects
    }

    /// A timer task woke up. Acts only if `token` is still the pending timer.
    pub fn on_timer_elapsed(&mut self, token: TimerToken) -> bool {
        if self.pending_timer != Some(token) {
            return false;
        }
        self.pending_timer = None;
        self.captured = false;
        if self.current + 1 < self.roster.len() {
            self.enter(self.current + 1);
        }
        true
    }

    fn ensure_open(&self) -> Result<(), AttendanceError> {
        if self.finished {
            Err(AttendanceError::Validation(
                "Attendance taking for this session is already finished.".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn stale(&self, ticket: &CaptureTicket) -> Option<Applied> {
        (self.finished || ticket.epoch != self.epoch).then(|| Applied::Stale {
            started_for: ticket.index,
            current: self.current,
        })
    }

    fn mark(&mut self, ticket: &CaptureTicket, method: AttendanceMethod) -> Applied {
        let student = ticket.student.clone();
        self.marked.insert(student.id.clone());
        self.captured = true;
        let text = match method {
            AttendanceMethod::Biometric => format!("Attendance recorded: {}", student.name),
            AttendanceMethod::Manual => format!("Manual attendance recorded: {}", student.name),
        };
        self.message = Some(Message::new(MessageKind::Success, text));

        let mut effects = self.cancel_pending();
        let token = self.tokens.issue();
        self.pending_timer = Some(token);
        effects.push(TimerEffect::Schedule {
            token,
            delay: AUTO_ADVANCE_DELAY,
        });
        Applied::Marked { student, effects }
    }

    fn move_to(&mut self, index: usize) -> Vec<TimerEffect> {
        let effects = self.cancel_pending();
        self.captured = false;
        self.enter(index);
        effects
    }

    fn enter(&mut self, index: usize) {
        self.current = index;
        self.epoch += 1;
        self.message = self
            .is_marked(&self.roster[index].id)
            .then(|| Message::new(MessageKind::Info, ALREADY_MARKED));
    }

    fn cancel_pending(&mut self) -> Vec<TimerEffect> {
        self.pending_timer
            .take()
            .map(TimerEffect::Cancel)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CeremonyError;

    fn roster() -> Vec<Student> {
        vec![
            Student::new("a", "Ana", true),
            Student::new("b", "Bruno", true),
            Student::new("c", "Carla", false),
        ]
    }

    fn state() -> SessionState {
        SessionState::new(roster()).unwrap()
    }

    fn scheduled(effects: &[TimerEffect]) -> TimerToken {
        effects
            .iter()
            .find_map(|e| match e {
                TimerEffect::Schedule { token, delay } => {
                    assert_eq!(*delay, AUTO_ADVANCE_DELAY);
                    Some(*token)
                }
                TimerEffect::Cancel(_) => None,
            })
            .expect("a timer should be scheduled")
    }

    fn mark_current(state: &mut SessionState) -> TimerToken {
        let ticket = state.begin_capture().unwrap();
        let id = ticket.student().id.clone();
        match state.apply_resolved(&ticket, &id, "").unwrap() {
            Applied::Marked { effects, .. } => scheduled(&effects),
            Applied::Stale { .. } => panic!("capture should apply"),
        }
    }

    #[test]
    fn test_empty_roster_is_rejected() {
        assert!(matches!(
            SessionState::new(Vec::new()),
            Err(AttendanceError::Validation(_))
        ));
    }

    #[test]
    fn test_progress_is_monotone_from_first_to_last() {
        let mut state = state();
        assert!((state.progress() - 1.0 / 3.0).abs() < f64::EPSILON);
        let mut last = state.progress();
        for _ in 0..5 {
            state.next();
            assert!(state.progress() >= last);
            last = state.progress();
        }
        assert!((state.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_navigation_is_clamped() {
        let mut state = state();
        assert!(state.previous().is_empty());
        assert_eq!(state.current_index(), 0);
        state.next();
        state.next();
        state.next();
        assert_eq!(state.phase(), Phase::Browsing(2));
        assert!(state.select_index(3).is_err());
        assert_eq!(state.current_index(), 2);
        state.select_index(0).unwrap();
        assert_eq!(state.current_index(), 0);
    }

    #[test]
    fn test_match_marks_and_schedules_advance() {
        let mut state = state();
        let token = mark_current(&mut state);
        assert_eq!(state.phase(), Phase::Captured(0));
        assert!(state.is_marked("a"));
        assert!(!state.can_capture());
        assert_eq!(state.message().unwrap().kind, MessageKind::Success);

        assert!(state.on_timer_elapsed(token));
        assert_eq!(state.phase(), Phase::Browsing(1));
        assert!(state.message().is_none());
        assert!(!state.on_timer_elapsed(token));
    }

    #[test]
    fn test_mismatch_leaves_position_and_marks() {
        let mut state = state();
        state.select_index(1).unwrap();
        let ticket = state.begin_capture().unwrap();
        let err = state.apply_resolved(&ticket, "a", "Ana").unwrap_err();
        assert!(matches!(err, AttendanceError::IdentityMismatch(ref name) if name == "Ana"));
        assert_eq!(state.current_index(), 1);
        assert_eq!(state.marked_count(), 0);
        assert_eq!(state.phase(), Phase::Browsing(1));
        assert!(state.pending_timer().is_none());
    }

    #[test]
    fn test_navigation_cancels_auto_advance() {
        let mut state = state();
        let token = mark_current(&mut state);
        let effects = state.previous();
        assert!(effects.is_empty(), "already at the first student");

        let effects = state.select_index(2).unwrap();
        assert_eq!(effects, vec![TimerEffect::Cancel(token)]);
        assert!(!state.on_timer_elapsed(token));
        assert_eq!(state.current_index(), 2);
    }

    #[test]
    fn test_result_for_previous_student_is_ignored() {
        let mut state = state();
        let ticket = state.begin_capture().unwrap();
        state.next();

        let applied = state.apply_resolved(&ticket, "a", "Ana").unwrap();
        assert_eq!(
            applied,
            Applied::Stale {
                started_for: 0,
                current: 1
            }
        );
        assert_eq!(state.marked_count(), 0);
    }

    #[test]
    fn test_failure_for_previous_student_keeps_message() {
        let mut state = state();
        let ticket = state.begin_capture().unwrap();
        state.next();
        let before = state.message().cloned();

        let applied = state
            .fail(&ticket, AttendanceError::Ceremony(CeremonyError::UserCancelled))
            .unwrap();
        assert_eq!(
            applied,
            Applied::Stale {
                started_for: 0,
                current: 1
            }
        );
        assert_eq!(state.message().cloned(), before);
    }

    #[test]
    fn test_returning_to_marked_student_shows_info() {
        let mut state = state();
        mark_current(&mut state);
        state.next();
        state.previous();
        assert_eq!(state.message().unwrap().kind, MessageKind::Info);
        assert!(state.begin_capture().is_err());
    }

    #[test]
    fn test_manual_mark_requires_token_and_advances() {
        let mut state = state();
        state.select_index(1).unwrap();
        let ticket = state.begin_capture().unwrap();
        assert_eq!(
            SessionState::manual_confirmation(&ticket),
            ConfirmationRequest::ManualAttendance {
                student: Student::new("b", "Bruno", true)
            }
        );
        let Applied::Marked { effects, .. } = state.apply_manual(&ticket, Confirmed::new()) else {
            panic!("manual capture should apply");
        };
        assert!(state.on_timer_elapsed(scheduled(&effects)));
        assert_eq!(state.current_index(), 2);
    }

    #[test]
    fn test_timer_at_last_student_stays_put() {
        let mut state = state();
        state.select_index(2).unwrap();
        let token = mark_current(&mut state);
        assert!(state.on_timer_elapsed(token));
        assert_eq!(state.phase(), Phase::Browsing(2));
    }

    #[test]
    fn test_finalize_is_terminal() {
        let mut state = state();
        let token = mark_current(&mut state);
        assert_eq!(
            state.finalize_confirmation(),
            ConfirmationRequest::Finalize {
                marked: 1,
                total: 3
            }
        );
        let effects = state.finalize(Confirmed::new());
        assert_eq!(effects, vec![TimerEffect::Cancel(token)]);
        assert_eq!(state.phase(), Phase::Finished);
        assert!(state.begin_capture().is_err());
        assert!(state.next().is_empty());
        assert!(state.is_marked("a"));
    }
}
