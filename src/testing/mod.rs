//! Unified testing utilities for rollcall
//!
//! Available under `cfg(test)` and, for integration tests, behind the
//! `testing` feature.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built rosters, groups and wired controllers
//! - [`mock`] - Scripted platform authenticator, backend gateway and confirmer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollcall::testing::{fixtures::TestFixtures, mock::{ScriptedCeremony, ScriptedConfirmer}};
//!
//! let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
//! rig.platform.push(ScriptedCeremony::Assert { raw_id: b"cred-a".to_vec() });
//! rig.gateway.resolve_as("a", "Ana");
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;

/// Common test constants
pub mod constants {
    /// Secure origin the fixtures serve from
    pub const TEST_ORIGIN: &str = "https://school.example";

    /// Plain-HTTP LAN origin, which is not a secure context
    pub const INSECURE_ORIGIN: &str = "http://192.168.1.50:3000";

    /// Group every fixture student belongs to
    pub const TEST_GROUP_ID: &str = "g-1";

    /// Relying party display name
    pub const TEST_RP_NAME: &str = "Roll Call";

    /// Date and time the mock gateway stamps on attendance
    pub const TEST_DATE: &str = "2026-03-02";
    pub const TEST_TIME: &str = "08:01:12";
}
