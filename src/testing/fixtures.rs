//! Test fixtures providing pre-built test objects
//!
//! Rosters, groups and fully wired controllers over the scripted ports, so
//! each test only scripts what it is about.

use std::sync::Arc;

use crate::credential::{CredentialBroker, ExecutionContext};
use crate::models::{Group, Student};
use crate::quick_capture::QuickCaptureController;
use crate::session::AttendanceSessionController;

use super::constants::{TEST_GROUP_ID, TEST_ORIGIN, TEST_RP_NAME};
use super::mock::{MockGateway, ScriptedAuthenticator, ScriptedConfirmer};

/// A roll-call session wired to scripted ports
pub struct SessionRig {
    pub controller: AttendanceSessionController,
    pub platform: Arc<ScriptedAuthenticator>,
    pub gateway: Arc<MockGateway>,
    pub confirmer: Arc<ScriptedConfirmer>,
}

/// A quick-capture controller wired to scripted ports, no group selected
pub struct QuickCaptureRig {
    pub controller: QuickCaptureController,
    pub platform: Arc<ScriptedAuthenticator>,
    pub gateway: Arc<MockGateway>,
}

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Ana, Bruno and Carla, in that order. Bruno has no fingerprint yet.
    #[must_use]
    pub fn roster() -> Vec<Student> {
        vec![
            Student::new("a", "Ana", true),
            Student::new("b", "Bruno", false),
            Student::new("c", "Carla", true),
        ]
    }

    #[must_use]
    pub fn group() -> Group {
        Group {
            id: TEST_GROUP_ID.to_string(),
            name: "Group A".to_string(),
            career: Some("Systems".to_string()),
            student_count: Self::roster().len(),
        }
    }

    /// Broker over `platform` served from `origin`
    ///
    /// # Panics
    ///
    /// Panics if `origin` is not an absolute URL.
    #[must_use]
    pub fn broker(platform: Arc<ScriptedAuthenticator>, origin: &str) -> Arc<CredentialBroker> {
        Arc::new(CredentialBroker::new(
            platform,
            ExecutionContext::from_origin(origin).expect("test origin must parse"),
            TEST_RP_NAME,
        ))
    }

    /// Session over [`roster`](Self::roster), positioned on Ana
    ///
    /// # Panics
    ///
    /// Panics if the session cannot be created.
    #[must_use]
    pub fn session_rig(confirmer: ScriptedConfirmer) -> SessionRig {
        let platform = Arc::new(ScriptedAuthenticator::new());
        let gateway = Arc::new(MockGateway::new());
        let confirmer = Arc::new(confirmer);
        let controller = AttendanceSessionController::new(
            Self::group(),
            Self::roster(),
            Self::broker(Arc::clone(&platform), TEST_ORIGIN),
            gateway.clone(),
            confirmer.clone(),
        )
        .expect("fixture roster is not empty");
        SessionRig {
            controller,
            platform,
            gateway,
            confirmer,
        }
    }

    /// Quick capture served from `origin`
    #[must_use]
    pub fn quick_capture_rig(origin: &str) -> QuickCaptureRig {
        let platform = Arc::new(ScriptedAuthenticator::new());
        let gateway = Arc::new(MockGateway::new());
        let controller = QuickCaptureController::new(
            Self::broker(Arc::clone(&platform), origin),
            gateway.clone(),
        );
        QuickCaptureRig {
            controller,
            platform,
            gateway,
        }
    }
}
