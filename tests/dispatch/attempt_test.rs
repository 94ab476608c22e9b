//! Delivery state machine tests.

use std::time::Duration;

use sms_scheduler::dispatch::{AttemptOutcome, AttemptState, DeliveryAttempt, RetryPolicy};
use sms_scheduler::transport::TransportError;

use super::support::{
    receipt, unavailable, LogBuffer, RecordingPause, ScriptedTransport, VALID_RECIPIENT,
};

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(5_000),
    }
}

#[tokio::test]
async fn first_attempt_success_needs_no_backoff() {
    let transport = ScriptedTransport::new(vec![Ok(receipt("SM1"))]);
    let pause = RecordingPause::default();

    let outcome = DeliveryAttempt::new(&transport, &pause, policy(), VALID_RECIPIENT, "hi")
        .run()
        .await;

    match outcome {
        AttemptOutcome::Succeeded { receipt, attempts } => {
            assert_eq!(receipt.id, "SM1");
            assert_eq!(attempts, 1);
        }
        other => panic!("expected success, got: {other:?}"),
    }
    assert!(pause.pauses().is_empty());
    assert_eq!(
        transport.calls(),
        vec![(VALID_RECIPIENT.to_owned(), "hi".to_owned())]
    );
}

#[tokio::test]
async fn succeeds_on_third_attempt_after_two_backoffs() {
    let transport = ScriptedTransport::failing(2);
    let pause = RecordingPause::default();

    let outcome = DeliveryAttempt::new(&transport, &pause, policy(), VALID_RECIPIENT, "hi")
        .run()
        .await;

    match outcome {
        AttemptOutcome::Succeeded { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected success, got: {other:?}"),
    }
    assert_eq!(transport.call_count(), 3);
    assert_eq!(pause.pauses(), vec![Duration::from_millis(5_000); 2]);
}

#[tokio::test]
async fn exhausted_budget_fails_with_last_error() {
    let transport = ScriptedTransport::new(vec![
        Err(unavailable()),
        Err(TransportError::Other("socket closed".to_owned())),
        Err(TransportError::Status {
            status: 400,
            body: "bad from number".to_owned(),
        }),
        Ok(receipt("never reached")),
    ]);
    let pause = RecordingPause::default();

    let outcome = DeliveryAttempt::new(&transport, &pause, policy(), VALID_RECIPIENT, "hi")
        .run()
        .await;

    match outcome {
        AttemptOutcome::Failed { error, attempts } => {
            assert_eq!(attempts, 3);
            assert_eq!(error.status(), Some(400));
        }
        other => panic!("expected failure, got: {other:?}"),
    }
    assert_eq!(transport.call_count(), 3);
    assert_eq!(pause.pauses().len(), 2);
}

#[tokio::test]
async fn single_attempt_budget_never_backs_off() {
    let transport = ScriptedTransport::failing(1);
    let pause = RecordingPause::default();
    let policy = RetryPolicy {
        max_attempts: 1,
        backoff: Duration::from_millis(5_000),
    };

    let outcome = DeliveryAttempt::new(&transport, &pause, policy, VALID_RECIPIENT, "hi")
        .run()
        .await;

    assert!(matches!(outcome, AttemptOutcome::Failed { attempts: 1, .. }));
    assert!(pause.pauses().is_empty());
}

#[tokio::test]
async fn step_walks_idle_attempting_retrying() {
    let transport = ScriptedTransport::failing(1);
    let pause = RecordingPause::default();
    let attempt = DeliveryAttempt::new(&transport, &pause, policy(), VALID_RECIPIENT, "hi");

    let state = attempt.step(AttemptState::Idle).await;
    assert!(matches!(state, AttemptState::Attempting { attempt: 0 }));

    let state = attempt.step(state).await;
    assert!(matches!(state, AttemptState::Retrying { attempt: 0 }));
    assert!(pause.pauses().is_empty(), "backoff happens on leaving Retrying");

    let state = attempt.step(state).await;
    assert!(matches!(state, AttemptState::Attempting { attempt: 1 }));
    assert_eq!(pause.pauses().len(), 1);

    let state = attempt.step(state).await;
    assert!(state.is_terminal());
    assert!(matches!(state, AttemptState::Succeeded { attempt: 1, .. }));
}

fn echoes_number(number: &str) -> TransportError {
    TransportError::Status {
        status: 400,
        body: format!(
            r#"{{"code":21211,"message":"The 'To' number {number} is not a valid phone number."}}"#
        ),
    }
}

#[tokio::test]
async fn failure_logs_never_contain_raw_recipient() {
    let logs = LogBuffer::default();
    let _guard = logs.capture();
    let transport = ScriptedTransport::new(vec![
        Err(echoes_number(VALID_RECIPIENT)),
        Err(echoes_number(VALID_RECIPIENT)),
        Err(echoes_number(VALID_RECIPIENT)),
    ]);
    let pause = RecordingPause::default();

    let outcome = DeliveryAttempt::new(&transport, &pause, policy(), VALID_RECIPIENT, "hi")
        .run()
        .await;

    assert!(matches!(outcome, AttemptOutcome::Failed { attempts: 3, .. }));
    let captured = logs.contents();
    assert!(captured.contains("21211"), "provider detail should be logged: {captured}");
    assert!(captured.contains("********2671"));
    assert!(!captured.contains(VALID_RECIPIENT), "raw recipient leaked: {captured}");
}

#[tokio::test]
async fn failure_logs_mask_provider_normalized_number() {
    let logs = LogBuffer::default();
    let _guard = logs.capture();
    let transport = ScriptedTransport::new(vec![Err(echoes_number("+14155552671"))]);
    let pause = RecordingPause::default();
    let single = RetryPolicy {
        max_attempts: 1,
        ..policy()
    };

    let _ = DeliveryAttempt::new(&transport, &pause, single, "(415) 555-2671", "hi")
        .run()
        .await;

    let captured = logs.contents();
    assert!(captured.contains("21211"));
    assert!(!captured.contains("4155552671"), "normalized number leaked: {captured}");
    assert!(!captured.contains("(415) 555-2671"));
}
