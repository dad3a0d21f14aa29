// Roll-call session flows driven through the public controller API
use std::time::Duration;

use rollcall::confirm::ConfirmationRequest;
use rollcall::error::{AttendanceError, CeremonyError};
use rollcall::session::{CaptureOutcome, MessageKind, Phase};
use rollcall::testing::fixtures::TestFixtures;
use rollcall::testing::mock::{ScriptedCeremony, ScriptedConfirmer};
use rollcall::timer::AUTO_ADVANCE_DELAY;

#[tokio::test]
async fn test_fingerprint_of_another_student_is_a_mismatch() {
    let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
    rig.controller.select_index(1).unwrap();
    rig.platform.push(ScriptedCeremony::Assert {
        raw_id: b"cred-a".to_vec(),
    });
    rig.gateway.resolve_as("a", "Ana");

    let err = rig.controller.capture_by_credential().await.unwrap_err();
    assert!(matches!(err, AttendanceError::IdentityMismatch(ref name) if name == "Ana"));
    assert_eq!(rig.controller.current_index(), 1);
    assert_eq!(rig.controller.phase(), Phase::Browsing(1));
    assert_eq!(rig.controller.marked_count(), 0);
    assert!(!rig.controller.has_pending_advance());
    assert_eq!(
        rig.controller.message().map(|m| m.kind),
        Some(MessageKind::Error)
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_capture_advances_after_delay() {
    let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
    rig.controller.select_index(1).unwrap();
    assert!(!rig.controller.current_student().has_credential);

    let outcome = rig.controller.capture_manually().await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Marked(ref s) if s.id == "b"));
    assert!(rig.controller.is_marked("b"));
    assert_eq!(rig.gateway.manual_records(), vec!["b".to_string()]);
    assert!(matches!(
        rig.confirmer.requests().as_slice(),
        [ConfirmationRequest::ManualAttendance { student }] if student.id == "b"
    ));

    tokio::time::sleep(AUTO_ADVANCE_DELAY - Duration::from_millis(1)).await;
    assert_eq!(rig.controller.current_index(), 1);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(rig.controller.current_index(), 2);
    assert_eq!(rig.controller.phase(), Phase::Browsing(2));
}

#[tokio::test(start_paused = true)]
async fn test_ceremony_timeout_leaves_session_untouched() {
    let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
    rig.controller.select_index(2).unwrap();
    let before = (
        rig.controller.current_index(),
        rig.controller.phase(),
        rig.controller.marked_ids(),
    );
    rig.platform.push(ScriptedCeremony::Hang);

    let err = rig.controller.capture_by_credential().await.unwrap_err();
    assert!(matches!(
        err,
        AttendanceError::Ceremony(CeremonyError::CeremonyFailed(_))
    ));
    assert_eq!(
        (
            rig.controller.current_index(),
            rig.controller.phase(),
            rig.controller.marked_ids(),
        ),
        before
    );
    assert!(rig.gateway.verifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_full_roll_call_then_finalize() {
    let rig = TestFixtures::session_rig(ScriptedConfirmer::answering(true));
    rig.gateway.enroll_credentials(&["Y3JlZC1h", "Y3JlZC1j"]);

    rig.platform.push(ScriptedCeremony::Assert {
        raw_id: b"cred-a".to_vec(),
    });
    rig.gateway.resolve_as("a", "Ana");
    rig.controller.capture_by_credential().await.unwrap();
    let allowed = rig.platform.last_request_options().unwrap().allow_credentials;
    assert_eq!(allowed.map(|a| a.len()), Some(2));

    tokio::time::sleep(AUTO_ADVANCE_DELAY + Duration::from_millis(1)).await;
    assert_eq!(rig.controller.current_index(), 1);

    // Bruno is skipped
    rig.controller.next();
    rig.platform.push(ScriptedCeremony::Assert {
        raw_id: b"cred-c".to_vec(),
    });
    rig.gateway.resolve_as("c", "Carla");
    rig.controller.capture_by_credential().await.unwrap();

    // Last student: the advance timer has nowhere to go
    tokio::time::sleep(AUTO_ADVANCE_DELAY * 2).await;
    assert_eq!(rig.controller.current_index(), 2);
    assert!((rig.controller.progress() - 1.0).abs() < f64::EPSILON);

    assert!(rig.controller.finalize().await);
    assert_eq!(rig.controller.phase(), Phase::Finished);
    assert!(rig.confirmer.requests().contains(&ConfirmationRequest::Finalize {
        marked: 2,
        total: 3
    }));
}
