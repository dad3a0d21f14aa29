// Quick capture flows driven through the public controller API
use std::time::Duration;

use rollcall::error::AttendanceError;
use rollcall::gateway::GatewayError;
use rollcall::testing::constants::TEST_ORIGIN;
use rollcall::testing::fixtures::TestFixtures;
use rollcall::testing::mock::ScriptedCeremony;
use rollcall::timer::AUTO_CLEAR_DELAY;

#[tokio::test]
async fn test_capture_without_group_makes_no_calls() {
    let rig = TestFixtures::quick_capture_rig(TEST_ORIGIN);

    let err = rig.controller.capture().await.unwrap_err();
    assert!(matches!(err, AttendanceError::Validation(_)));
    assert_eq!(rig.gateway.call_count(), 0);
    assert_eq!(rig.platform.ceremony_count(), 0);
    assert_eq!(rig.controller.attempts(), 0);
    assert!(rig.controller.failure().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_success_is_shown_then_cleared() {
    let rig = TestFixtures::quick_capture_rig(TEST_ORIGIN);
    rig.controller.select_group(TestFixtures::group());

    // One miss first, so the counter has something to reset
    rig.platform.push(ScriptedCeremony::Cancel);
    assert!(rig.controller.capture().await.is_err());

    rig.platform.push(ScriptedCeremony::Assert {
        raw_id: b"cred-c".to_vec(),
    });
    rig.gateway.resolve_as("c", "Carla");
    let result = rig.controller.retry().await.unwrap();
    assert_eq!(result.student.id, "c");
    assert_eq!(rig.controller.attempts(), 2);
    assert!(rig.controller.failure().is_none());

    let verification = rig.gateway.verifications().pop().unwrap();
    assert_eq!(verification.group_id.as_deref(), Some("g-1"));

    tokio::time::sleep(AUTO_CLEAR_DELAY - Duration::from_millis(1)).await;
    assert_eq!(
        rig.controller.result().map(|r| r.student.name),
        Some("Carla".to_string())
    );

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(rig.controller.result().is_none());
    assert_eq!(rig.controller.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_capture_cancels_pending_clear() {
    let rig = TestFixtures::quick_capture_rig(TEST_ORIGIN);
    rig.controller.select_group(TestFixtures::group());
    rig.gateway.resolve_as("a", "Ana");

    rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
    rig.controller.capture().await.unwrap();
    tokio::time::sleep(Duration::from_millis(4000)).await;

    rig.platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
    rig.controller.capture().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2000)).await;

    // The first clear would have fired by now
    assert!(rig.controller.result().is_some());
    assert_eq!(rig.controller.attempts(), 2);
}

#[tokio::test]
async fn test_network_failure_keeps_counting() {
    let rig = TestFixtures::quick_capture_rig(TEST_ORIGIN);
    rig.controller.select_group(TestFixtures::group());
    rig.gateway
        .fail_challenge(GatewayError::Transport("connection refused".to_string()));

    let err = rig.controller.capture().await.unwrap_err();
    assert!(matches!(err, AttendanceError::Network(_)));
    assert_eq!(rig.platform.ceremony_count(), 0);
    assert_eq!(rig.controller.attempts(), 1);
    assert!(!rig.controller.failure().unwrap().suggestions.is_empty());
}
