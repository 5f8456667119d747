// ============================================================================
// Orchestrator Tests
// ============================================================================

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use super::{
    AnimationPhase, BusyStage, EncodeOutcome, EncodingState, Encoder, Orchestrator,
    snapshot_channel,
};
use crate::{
    config::{ANIMATION_TASK, DEFAULT_DISPLAY_NAME, DEFAULT_IDENTIFIER},
    scheduler::PeriodicScheduler,
    source::{preload::Preloader, selector::FileSelector},
    testing::{RecordingEncoder, StubSource},
};

struct Fixture {
    scheduler: Arc<PeriodicScheduler>,
    selector: Arc<FileSelector>,
    orchestrator: Arc<Orchestrator>,
}

fn fixture(
    source: Arc<StubSource>,
    encoder: impl FnOnce(&Arc<PeriodicScheduler>, &Arc<FileSelector>) -> Arc<dyn Encoder>,
) -> anyhow::Result<Fixture> {
    let scheduler = Arc::new(PeriodicScheduler::new()?);
    let preloader = Arc::new(Preloader::new(source, 1024, 5));
    let (tx, rx) = snapshot_channel();
    let selector = Arc::new(FileSelector::new(
        preloader,
        rx,
        DEFAULT_DISPLAY_NAME,
        DEFAULT_IDENTIFIER,
    ));
    let encoder = encoder(&scheduler, &selector);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&selector),
        Arc::clone(&scheduler),
        encoder,
        Arc::new(AnimationPhase::new(3)),
        Duration::from_millis(15),
        tx,
    ));
    orchestrator.activate();
    Ok(Fixture {
        scheduler,
        selector,
        orchestrator,
    })
}

fn recording(
    scheduler: &Arc<PeriodicScheduler>,
    configure: impl FnOnce(RecordingEncoder) -> RecordingEncoder,
    slot: &Arc<Mutex<Option<Arc<RecordingEncoder>>>>,
) -> Arc<dyn Encoder> {
    let encoder = Arc::new(configure(RecordingEncoder::new(Arc::clone(scheduler))));
    *slot.lock().unwrap() = Some(Arc::clone(&encoder));
    encoder
}

fn take(slot: &Arc<Mutex<Option<Arc<RecordingEncoder>>>>) -> Arc<RecordingEncoder> {
    slot.lock().unwrap().clone().unwrap()
}

/// Records every distinct state the orchestrator publishes.
fn observe(
    orchestrator: &Orchestrator,
) -> (Arc<Mutex<Vec<EncodingState>>>, tokio::task::JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(vec![orchestrator.snapshot().state]));
    let mut rx = orchestrator.subscribe();
    let log = Arc::clone(&seen);
    let handle = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().state;
            let mut log = log.lock().unwrap();
            if log.last() != Some(&state) {
                log.push(state);
            }
        }
    });
    (seen, handle)
}

// ------------------------------------------------------------------------
// Encode Transition Tests
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_encode_success_transitions_and_animation() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(StubSource::ok(b"default asset"), |s, _| {
        recording(s, |e| e, &slot)
    })?;
    let encoder = take(&slot);
    let (seen, observer) = observe(&f.orchestrator);

    assert!(f.scheduler.is_running(ANIMATION_TASK));
    let before = f.scheduler.generation(ANIMATION_TASK);

    let outcome = f.orchestrator.start_encoding().await?;
    assert!(outcome.is_success());

    let calls = encoder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload, b"default asset");
    assert_eq!(calls[0].identifier, DEFAULT_IDENTIFIER);
    assert!(!calls[0].animation_running, "animation must stop before encode");

    assert!(f.scheduler.is_running(ANIMATION_TASK));
    assert_ne!(f.scheduler.generation(ANIMATION_TASK), before);

    let snapshot = f.orchestrator.snapshot();
    assert_eq!(snapshot.state, EncodingState::Idle);
    assert_eq!(snapshot.stage, None);
    assert_eq!(snapshot.attempts, 1);
    assert_eq!(snapshot.last_outcome, Some(outcome));

    tokio::task::yield_now().await;
    observer.abort();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![EncodingState::Idle, EncodingState::Busy, EncodingState::Idle]
    );
    Ok(())
}

#[tokio::test]
async fn test_encode_failure_returns_to_idle() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(StubSource::ok(b"default asset"), |s, _| {
        recording(s, |e| e.failing(), &slot)
    })?;
    let encoder = take(&slot);
    let (seen, observer) = observe(&f.orchestrator);

    let outcome = f.orchestrator.start_encoding().await?;
    match &outcome {
        EncodeOutcome::Failed { identifier, reason, .. } => {
            assert_eq!(identifier, DEFAULT_IDENTIFIER);
            assert!(reason.contains("encoder rejected"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!encoder.calls()[0].animation_running);
    assert!(f.scheduler.is_running(ANIMATION_TASK));
    assert_eq!(f.orchestrator.snapshot().state, EncodingState::Idle);

    tokio::task::yield_now().await;
    observer.abort();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![EncodingState::Idle, EncodingState::Busy, EncodingState::Idle]
    );

    // a failed attempt does not block the next one
    f.orchestrator.start_encoding().await?;
    assert_eq!(encoder.calls().len(), 2);
    assert_eq!(f.orchestrator.snapshot().attempts, 2);
    Ok(())
}

// ------------------------------------------------------------------------
// Busy Gating Tests
// ------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_start_encoding_while_busy_is_rejected() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(
        StubSource::slow(b"slow asset", Duration::from_millis(500)),
        |s, _| recording(s, |e| e, &slot),
    )?;
    let encoder = take(&slot);
    let orchestrator = &f.orchestrator;

    let (first, (busy_at_second_call, second)) = tokio::join!(orchestrator.start_encoding(), async {
        tokio::task::yield_now().await;
        let snapshot = orchestrator.snapshot();
        (snapshot, orchestrator.start_encoding().await)
    });

    assert!(first?.is_success());
    assert_eq!(busy_at_second_call.state, EncodingState::Busy);
    assert_eq!(busy_at_second_call.stage, Some(BusyStage::Resolving));
    let err = second.unwrap_err();
    assert!(err.is_invalid_transition(), "{}", err);
    assert_eq!(encoder.calls().len(), 1);
    assert_eq!(orchestrator.snapshot().attempts, 1);
    Ok(())
}

#[tokio::test]
async fn test_selection_rejected_during_encode() -> anyhow::Result<()> {
    let rejected = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&rejected);
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(StubSource::ok(b"default asset"), |s, selector| {
        let selector = Arc::clone(selector);
        recording(
            s,
            move |e| {
                e.with_hook(move || {
                    let select = selector.select("late.bin", b"late".to_vec());
                    let clear = selector.clear();
                    let both = matches!(select, Err(ref e) if e.is_invalid_transition())
                        && matches!(clear, Err(ref e) if e.is_invalid_transition());
                    flag.store(both, Ordering::SeqCst);
                })
            },
            &slot,
        )
    })?;

    f.selector.select("picked.bin", b"picked".to_vec())?;
    let outcome = f.orchestrator.start_encoding().await?;

    assert!(rejected.load(Ordering::SeqCst));
    assert_eq!(take(&slot).calls()[0].payload, b"picked");
    match outcome {
        EncodeOutcome::Encoded { identifier, bytes, .. } => {
            assert_eq!(identifier, "picked.bin");
            assert_eq!(bytes, 6);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(f.selector.display_name(), "picked.bin");

    f.selector.clear()?;
    assert_eq!(f.selector.display_name(), DEFAULT_DISPLAY_NAME);
    Ok(())
}

// ------------------------------------------------------------------------
// Teardown Tests
// ------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_abandoned_attempt_returns_to_idle() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(
        StubSource::slow(b"slow asset", Duration::from_secs(5)),
        |s, _| recording(s, |e| e, &slot),
    )?;

    let attempt = tokio::time::timeout(
        Duration::from_millis(100),
        f.orchestrator.start_encoding(),
    )
    .await;
    assert!(attempt.is_err());

    let snapshot = f.orchestrator.snapshot();
    assert_eq!(snapshot.state, EncodingState::Idle);
    assert!(matches!(snapshot.last_outcome, Some(EncodeOutcome::Failed { .. })));
    assert!(f.scheduler.is_running(ANIMATION_TASK));
    assert!(take(&slot).calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_during_encode_leaves_no_live_tasks() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(StubSource::ok(b"default asset"), |s, _| {
        let scheduler = Arc::clone(s);
        recording(
            s,
            move |e| {
                e.with_hook(move || {
                    scheduler.shutdown();
                })
            },
            &slot,
        )
    })?;

    let outcome = f.orchestrator.start_encoding().await?;

    assert!(outcome.is_success());
    assert_eq!(take(&slot).calls().len(), 1);
    assert_eq!(f.orchestrator.snapshot().state, EncodingState::Idle);
    assert!(!f.scheduler.is_running(ANIMATION_TASK));
    assert_eq!(f.scheduler.live_count(), 0);
    Ok(())
}

// ------------------------------------------------------------------------
// Animation Phase Tests
// ------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_animation_advances_only_while_idle() -> anyhow::Result<()> {
    let slot = Arc::new(Mutex::new(None));
    let f = fixture(StubSource::ok(b"asset"), |s, _| recording(s, |e| e, &slot))?;
    let phase = Arc::clone(f.orchestrator.phase());

    tokio::time::sleep(Duration::from_millis(155)).await;
    assert_eq!(phase.get(), 30);

    f.scheduler.stop(ANIMATION_TASK);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(phase.get(), 30);
    Ok(())
}

#[test]
fn test_phase_wraps_at_360() {
    let phase = AnimationPhase::new(3);
    for _ in 0..119 {
        phase.advance();
    }
    assert_eq!(phase.get(), 357);
    assert_eq!(phase.advance(), 0);

    let odd = AnimationPhase::new(7);
    for _ in 0..52 {
        odd.advance();
    }
    assert_eq!(odd.get(), 4);
    assert!(odd.get() < 360);
}
