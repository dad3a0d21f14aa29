// Centralized logging for ceremonies, captures and timers
use std::time::Duration;

use log::{debug, info, warn};

use crate::credential::{Availability, Ceremony};
use crate::error::{AttendanceError, CeremonyError};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Shorten a credential id for log output
    #[must_use]
    pub fn short_id(id: &str) -> &str {
        id.get(..8).unwrap_or(id)
    }

    /// Log availability probe result
    pub fn log_availability(availability: &Availability) {
        info!(
            "🔍 Platform authenticator available={} ({:?})",
            availability.available, availability.reason
        );
    }

    /// Log ceremony start
    pub fn log_ceremony_started(ceremony: Ceremony, allowed_credentials: usize) {
        if allowed_credentials > 0 {
            info!(
                "🔄 Starting {ceremony} ceremony restricted to {allowed_credentials} credential(s)"
            );
        } else {
            info!("🔄 Starting {ceremony} ceremony");
        }
    }

    /// Log ceremony completion
    pub fn log_ceremony_completed(ceremony: Ceremony, credential_id: &str) {
        info!(
            "✅ {ceremony} ceremony completed for credential {}…",
            Self::short_id(credential_id)
        );
    }

    /// Log classified ceremony failure
    pub fn log_ceremony_failed(ceremony: Ceremony, error: &CeremonyError) {
        match error {
            CeremonyError::UserCancelled => info!("⏭️  {ceremony} ceremony cancelled by user"),
            _ => warn!("❌ {ceremony} ceremony failed: {error}"),
        }
    }

    /// Log the outcome of a capture attempt
    pub fn log_capture_outcome(flow: &str, result: Result<&str, &AttendanceError>) {
        match result {
            Ok(student) => info!("🎯 [{flow}] attendance captured for {student}"),
            Err(e) => warn!("[{flow}] capture failed: {e}"),
        }
    }

    /// Log timer scheduling
    pub fn log_timer_scheduled(kind: &str, delay: Duration) {
        debug!("Scheduled {kind} timer in {} ms", delay.as_millis());
    }

    /// Log timer cancellation
    pub fn log_timer_cancelled(kind: &str) {
        debug!("Cancelled pending {kind} timer");
    }

    /// Log a result that arrived after the user moved on
    pub fn log_stale_result(started_for: usize, current: usize) {
        info!("Ignoring capture result for position {started_for}; session is now at {current}");
    }
}
