//! Dispatcher orchestration tests.

use std::sync::Arc;
use std::time::Duration;

use sms_scheduler::delay::{DelayPolicy, SchedulingMode};
use sms_scheduler::dispatch::{
    DispatchError, DispatchSettings, Dispatcher, OutcomeKind, RetryPolicy, MSG_RETRIES_EXHAUSTED,
    MSG_SENT,
};
use sms_scheduler::messages::{FileCursor, IndexCursor, MemoryCursor, MessagePool, SelectionMode};

use super::support::{
    receipt, RecordingPause, ReadOnlyCursor, ScriptedTransport, VALID_RECIPIENT,
};

const BACKOFF: Duration = Duration::from_millis(5_000);

fn settings(selection: SelectionMode, scheduling: SchedulingMode) -> DispatchSettings {
    DispatchSettings {
        selection,
        scheduling,
        delay: DelayPolicy::new(0, 180),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: BACKOFF,
        },
    }
}

fn pool(messages: &[&str]) -> MessagePool {
    match MessagePool::new(messages.iter().map(|m| (*m).to_owned()).collect()) {
        Ok(pool) => pool,
        Err(err) => panic!("pool should build: {err}"),
    }
}

fn dispatcher(
    transport: &Arc<ScriptedTransport>,
    pause: &Arc<RecordingPause>,
    settings: DispatchSettings,
) -> Dispatcher {
    Dispatcher::new(transport.clone(), pause.clone(), settings)
}

#[tokio::test]
async fn rotating_success_advances_cursor_modulo_pool_len() {
    for len in 1..=5_usize {
        let names: Vec<String> = (0..len).map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let pool = pool(&refs);

        for start in 0..len {
            let transport = Arc::new(ScriptedTransport::default());
            let pause = Arc::new(RecordingPause::default());
            let dispatcher = dispatcher(
                &transport,
                &pause,
                settings(SelectionMode::Rotating, SchedulingMode::Immediate),
            );
            let cursor = MemoryCursor::new(start);

            let result = dispatcher.dispatch(&pool, &cursor, VALID_RECIPIENT).await;

            assert!(result.success);
            assert_eq!(cursor.read(), (start + 1) % len, "len={len} start={start}");
            assert_eq!(transport.calls()[0].1, format!("m{start}"));
        }
    }
}

#[tokio::test]
async fn persisted_cursor_wraps_from_last_message_to_first() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("cursor");
    std::fs::write(&path, "2").expect("should seed cursor");
    let cursor = FileCursor::new(&path);

    let transport = Arc::new(ScriptedTransport::default());
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );

    let result = dispatcher
        .dispatch(&pool(&["A", "B", "C"]), &cursor, VALID_RECIPIENT)
        .await;

    assert!(result.success);
    assert_eq!(result.message, MSG_SENT);
    assert_eq!(transport.calls()[0].1, "C");
    assert_eq!(cursor.read(), 0);
    let persisted = std::fs::read_to_string(&path).expect("cursor file should exist");
    assert_eq!(persisted.trim(), "0");
}

#[tokio::test]
async fn invalid_recipients_short_circuit_without_side_effects() {
    for recipient in ["", "   ", "12", "abc", "call me maybe", "+", "555-CALL-NOW"] {
        let transport = Arc::new(ScriptedTransport::default());
        let pause = Arc::new(RecordingPause::default());
        let dispatcher = dispatcher(
            &transport,
            &pause,
            settings(SelectionMode::Rotating, SchedulingMode::Delayed),
        );
        let cursor = MemoryCursor::new(1);

        let result = dispatcher
            .dispatch(&pool(&["A", "B", "C"]), &cursor, recipient)
            .await;

        assert!(!result.success, "{recipient:?} should be rejected");
        assert!(result.message.contains("Invalid phone number"));
        assert_eq!(result.kind, OutcomeKind::InvalidRecipient);
        assert_eq!(result.http_status(), 400);
        assert_eq!(transport.call_count(), 0);
        assert!(pause.pauses().is_empty(), "no delay or backoff for {recipient:?}");
        assert_eq!(cursor.read(), 1, "cursor untouched for {recipient:?}");
    }
}

#[tokio::test]
async fn exhausted_retries_report_failure_and_keep_cursor() {
    let transport = Arc::new(ScriptedTransport::failing(3));
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );
    let cursor = MemoryCursor::new(0);

    let result = dispatcher
        .dispatch(&pool(&["A", "B"]), &cursor, VALID_RECIPIENT)
        .await;

    assert!(!result.success);
    assert_eq!(result.message, MSG_RETRIES_EXHAUSTED);
    assert_eq!(result.http_status(), 500);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(pause.pauses(), vec![BACKOFF; 2]);
    assert_eq!(cursor.read(), 0);
}

#[tokio::test]
async fn recovers_after_two_failures() {
    let transport = Arc::new(ScriptedTransport::failing(2));
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );
    let cursor = MemoryCursor::new(0);

    let result = dispatcher
        .dispatch(&pool(&["A", "B"]), &cursor, VALID_RECIPIENT)
        .await;

    assert!(result.success);
    assert_eq!(result.receipt_id.as_deref(), Some("SM-default"));
    assert_eq!(pause.pauses(), vec![BACKOFF; 2]);
    assert_eq!(cursor.read(), 1);
}

#[tokio::test]
async fn delayed_mode_pauses_once_before_first_attempt() {
    let transport = Arc::new(ScriptedTransport::failing(1));
    let pause = Arc::new(RecordingPause::default());
    let mut settings = settings(SelectionMode::Random, SchedulingMode::Delayed);
    settings.delay = DelayPolicy::new(10, 20);
    let dispatcher = dispatcher(&transport, &pause, settings);

    let result = dispatcher.send_message(VALID_RECIPIENT, "hello").await;

    assert!(result.success);
    let pauses = pause.pauses();
    assert_eq!(pauses.len(), 2, "one jitter delay plus one backoff");
    assert!(pauses[0] >= Duration::from_secs(10) && pauses[0] <= Duration::from_secs(20));
    assert_eq!(pauses[1], BACKOFF);
}

#[tokio::test]
async fn random_selection_never_writes_cursor() {
    let transport = Arc::new(ScriptedTransport::default());
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Random, SchedulingMode::Immediate),
    );
    // Writes would fail loudly; random mode must not attempt one.
    let cursor = ReadOnlyCursor(0);
    let pool = pool(&["A", "B", "C"]);

    for _ in 0..20 {
        let result = dispatcher.dispatch(&pool, &cursor, VALID_RECIPIENT).await;
        assert!(result.success);
    }
    for (_, body) in transport.calls() {
        assert!(["A", "B", "C"].contains(&body.as_str()));
    }
}

#[tokio::test]
async fn cursor_write_failure_does_not_fail_dispatch() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(receipt("SM9"))]));
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );

    let result = dispatcher
        .dispatch(&pool(&["A", "B"]), &ReadOnlyCursor(1), VALID_RECIPIENT)
        .await;

    assert!(result.success);
    assert_eq!(result.receipt_id.as_deref(), Some("SM9"));
}

#[tokio::test]
async fn out_of_range_cursor_restarts_rotation() {
    let transport = Arc::new(ScriptedTransport::default());
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );
    let cursor = MemoryCursor::new(7);

    let result = dispatcher
        .dispatch(&pool(&["A", "B", "C"]), &cursor, VALID_RECIPIENT)
        .await;

    assert!(result.success);
    assert_eq!(transport.calls()[0].1, "A");
    assert_eq!(cursor.read(), 1);
}

#[tokio::test]
async fn scheduled_run_sends_same_message_to_each_recipient() {
    let transport = Arc::new(ScriptedTransport::default());
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );
    let cursor = MemoryCursor::new(1);
    let recipients = vec![
        "+14155550101".to_owned(),
        "not a number".to_owned(),
        "+447911123456".to_owned(),
    ];

    let results = dispatcher
        .run_scheduled(&pool(&["A", "B", "C"]), &cursor, &recipients)
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[2].success);
    assert_eq!(
        transport.calls(),
        vec![
            ("+14155550101".to_owned(), "B".to_owned()),
            ("+447911123456".to_owned(), "B".to_owned()),
        ]
    );
    assert_eq!(cursor.read(), 2, "cursor advances once per run");
}

#[tokio::test]
async fn scheduled_run_with_no_successes_keeps_cursor() {
    let transport = Arc::new(ScriptedTransport::failing(3));
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );
    let cursor = MemoryCursor::new(0);

    let results = dispatcher
        .run_scheduled(&pool(&["A", "B"]), &cursor, &[VALID_RECIPIENT.to_owned()])
        .await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(cursor.read(), 0);
}

#[tokio::test]
async fn scheduled_run_without_recipients_is_a_no_op() {
    let transport = Arc::new(ScriptedTransport::default());
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Delayed),
    );
    let cursor = MemoryCursor::new(0);

    let results = dispatcher
        .run_scheduled(&pool(&["A"]), &cursor, &[])
        .await;

    assert!(results.is_empty());
    assert_eq!(transport.call_count(), 0);
    assert!(pause.pauses().is_empty());
}

#[tokio::test]
async fn deliver_exposes_error_taxonomy() {
    let transport = Arc::new(ScriptedTransport::failing(3));
    let pause = Arc::new(RecordingPause::default());
    let dispatcher = dispatcher(
        &transport,
        &pause,
        settings(SelectionMode::Rotating, SchedulingMode::Immediate),
    );

    match dispatcher.deliver("", "x").await {
        Err(DispatchError::InvalidRecipient { masked }) => assert!(masked.is_empty()),
        other => panic!("expected invalid recipient, got: {other:?}"),
    }

    match dispatcher.deliver(VALID_RECIPIENT, "x").await {
        Err(DispatchError::DeliveryFailed {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error.status(), Some(503));
        }
        other => panic!("expected delivery failure, got: {other:?}"),
    }
}

#[test]
fn dispatch_result_serializes_success_and_message_only() {
    let result = sms_scheduler::dispatch::DispatchResult::sent(receipt("SM1"));
    let json = serde_json::to_value(&result).expect("result should serialize");
    assert_eq!(
        json,
        serde_json::json!({ "success": true, "message": "SMS sent successfully." })
    );
}
