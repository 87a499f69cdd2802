//! Integration tests for [`bot_runtime::Poller`].
//!
//! Covers: offset advance to max id + 1, skipping of stale ids, backpressure from a full queue,
//! retry after retrieval errors, and exit on cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bot_runtime::{DispatchError, Poller, RuntimeConfig};
use common::{text_update, wait_until, CollectedErrors, ScriptedSource, Step};
use dbot_core::Update;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn new_poller(
    source: Arc<ScriptedSource>,
    capacity: usize,
    config: &RuntimeConfig,
) -> (Poller, mpsc::Receiver<Update>, CancellationToken, CollectedErrors) {
    let (tx, rx) = mpsc::channel(capacity);
    let root = CancellationToken::new();
    let errors = CollectedErrors::default();
    let poller = Poller::new(source, tx, root.clone(), errors.handler(), config);
    (poller, rx, root, errors)
}

/// **Test: After a batch the offset is the highest id + 1 and is sent on the next request.**
///
/// **Setup:** One batch with ids 1, 2, 3; queue capacity 10.
/// **Expected:** Offset 4; second request carries offset 4; run returns 4 after cancel.
#[tokio::test]
async fn test_offset_advances_past_batch() {
    let source = ScriptedSource::batches([vec![
        text_update(1, 10, "a"),
        text_update(2, 10, "b"),
        text_update(3, 10, "c"),
    ]]);
    let (poller, mut rx, root, _errors) = new_poller(source.clone(), 10, &RuntimeConfig::default());
    let offset = poller.offset_handle();
    let task = tokio::spawn(poller.run());

    for expected in 1..=3 {
        assert_eq!(rx.recv().await.map(|u| u.id), Some(expected));
    }
    wait_until(|| source.requests().len() >= 2).await;
    assert_eq!(offset.get(), 4);
    assert_eq!(source.requests()[0].offset, 0);
    assert_eq!(source.requests()[1].offset, 4);

    root.cancel();
    assert_eq!(task.await.unwrap(), 4);
}

/// **Test: Request carries limit, timeout and allowed update types from the config.**
#[tokio::test]
async fn test_request_parameters_follow_config() {
    let source = ScriptedSource::idle();
    let config = RuntimeConfig {
        poll_limit: 20,
        poll_timeout_secs: 30,
        allowed_updates: vec!["message".to_string(), "callback_query".to_string()],
        initial_offset: 42,
        ..RuntimeConfig::default()
    };
    let (poller, _rx, root, _errors) = new_poller(source.clone(), 10, &config);
    let task = tokio::spawn(poller.run());

    wait_until(|| !source.requests().is_empty()).await;
    let request = source.requests()[0].clone();
    assert_eq!(request.offset, 42);
    assert_eq!(request.limit, 20);
    assert_eq!(request.timeout_secs, 30);
    assert_eq!(request.allowed_updates, config.allowed_updates);

    root.cancel();
    assert_eq!(task.await.unwrap(), 42);
}

/// **Test: Updates below the offset are skipped.**
///
/// **Setup:** Initial offset 5; batch with ids 3, 4, 5, 6.
/// **Expected:** Queue receives 5 and 6 only; offset 7.
#[tokio::test]
async fn test_stale_updates_are_skipped() {
    let source = ScriptedSource::batches([vec![
        text_update(3, 10, "old"),
        text_update(4, 10, "old"),
        text_update(5, 10, "new"),
        text_update(6, 10, "new"),
    ]]);
    let config = RuntimeConfig {
        initial_offset: 5,
        ..RuntimeConfig::default()
    };
    let (poller, mut rx, root, _errors) = new_poller(source, 10, &config);
    let offset = poller.offset_handle();
    let task = tokio::spawn(poller.run());

    assert_eq!(rx.recv().await.map(|u| u.id), Some(5));
    assert_eq!(rx.recv().await.map(|u| u.id), Some(6));
    wait_until(|| offset.get() == 7).await;

    root.cancel();
    assert_eq!(task.await.unwrap(), 7);
    assert!(rx.try_recv().is_err());
}

/// **Test: A full queue blocks the poller and holds the offset back.**
///
/// **Setup:** Queue capacity 2; batch with ids 1, 2, 3; nobody consuming.
/// **Action:** Wait, then receive one update.
/// **Expected:** Offset stays 3 while blocked (update 3 not acknowledged); becomes 4 once a slot frees.
#[tokio::test]
async fn test_full_queue_applies_backpressure() {
    let source = ScriptedSource::batches([vec![
        text_update(1, 10, "a"),
        text_update(2, 10, "b"),
        text_update(3, 10, "c"),
    ]]);
    let (poller, mut rx, root, _errors) = new_poller(source.clone(), 2, &RuntimeConfig::default());
    let offset = poller.offset_handle();
    let task = tokio::spawn(poller.run());

    wait_until(|| offset.get() == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(offset.get(), 3);
    assert_eq!(source.requests().len(), 1);

    assert_eq!(rx.recv().await.map(|u| u.id), Some(1));
    wait_until(|| offset.get() == 4).await;

    root.cancel();
    assert_eq!(task.await.unwrap(), 4);
}

/// **Test: A retrieval error is reported and retried after the pause with the same offset.**
///
/// **Setup:** Script: failure, then a batch with id 1; paused clock.
/// **Expected:** One Poll error; the retry happens no earlier than the retry delay; both requests
/// use offset 0.
#[tokio::test(start_paused = true)]
async fn test_retries_after_error() {
    let source = ScriptedSource::new([
        Step::Fail("connection reset".to_string()),
        Step::Batch(vec![text_update(1, 10, "a")]),
    ]);
    let config = RuntimeConfig {
        poll_retry_delay: Duration::from_secs(3),
        ..RuntimeConfig::default()
    };
    let (poller, mut rx, root, errors) = new_poller(source.clone(), 10, &config);
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(poller.run());

    assert_eq!(rx.recv().await.map(|u| u.id), Some(1));
    assert!(started.elapsed() >= Duration::from_secs(3));

    errors.with(|errors| {
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], DispatchError::Poll(_)));
        assert!(errors[0].to_string().starts_with("failed to get updates, error: "));
    });
    let requests = source.requests();
    assert_eq!(requests[0].offset, 0);
    assert_eq!(requests[1].offset, 0);

    root.cancel();
    assert_eq!(task.await.unwrap(), 2);
}

/// **Test: Cancel ends the loop during an idle long poll.**
#[tokio::test]
async fn test_cancel_interrupts_long_poll() {
    let source = ScriptedSource::idle();
    let (poller, _rx, root, errors) = new_poller(source.clone(), 10, &RuntimeConfig::default());
    let task = tokio::spawn(poller.run());

    wait_until(|| source.requests().len() == 1).await;
    root.cancel();

    let offset = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("poller exits on cancel")
        .unwrap();
    assert_eq!(offset, 0);
    assert_eq!(errors.len(), 0);
}

/// **Test: Cancel ends the loop while blocked on a full queue; the blocked update is not acknowledged.**
///
/// **Setup:** Queue capacity 1; batch with ids 1, 2.
/// **Expected:** Run returns 2; only update 1 is in the queue.
#[tokio::test]
async fn test_cancel_interrupts_blocked_enqueue() {
    let source = ScriptedSource::batches([vec![text_update(1, 10, "a"), text_update(2, 10, "b")]]);
    let (poller, mut rx, root, _errors) = new_poller(source, 1, &RuntimeConfig::default());
    let offset = poller.offset_handle();
    let task = tokio::spawn(poller.run());

    wait_until(|| offset.get() == 2).await;
    root.cancel();

    assert_eq!(task.await.unwrap(), 2);
    assert_eq!(rx.recv().await.map(|u| u.id), Some(1));
}
