//! Sequential roll-call sessions
//!
//! A session walks a fixed, ordered roster one student at a time. Each
//! student is marked by fingerprint or, after confirmation, manually; a mark
//! advances to the next student after a short pause unless the user
//! navigates first.

pub mod controller;
pub mod state;

pub use controller::{AttendanceSessionController, CaptureOutcome};
pub use state::{Applied, CaptureTicket, Message, MessageKind, Phase, SessionState};
