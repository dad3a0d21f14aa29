//! Quick capture
//!
//! One action identifies whoever touches the sensor among the enrolled
//! students of the selected group and records their attendance. Roster order
//! plays no part. A success stays on screen briefly and then clears itself so
//! the next student can step up.

pub mod controller;
pub mod state;

pub use controller::QuickCaptureController;
pub use state::{
    CaptureFailure, QuickCaptureResult, QuickCaptureState, QuickTicket, GENERIC_SUGGESTIONS,
};
