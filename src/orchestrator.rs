//! The busy/idle state machine around the blocking encode.
//!
//! ```text
//!  Idle ──start_encoding()──► Busy(Resolving) ──payload──► Busy(Encoding) ──encode returns──► Idle
//!    ▲        │                                                                      │
//!    │        └─ stop("animation") before any await                                   │
//!    └──────────────────── start("animation") ◄─── Ok or Err ────────────────────────┘
//! ```
//!
//! The encode runs inline on the runtime thread. While it runs, no other task
//! on that runtime gets polled: ticks, input dispatch and rendering all stall.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use blob_encoder::Settings;
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    config::ANIMATION_TASK,
    error::{DemoError, DemoResult},
    scheduler::PeriodicScheduler,
    source::selector::FileSelector,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EncodingState {
    Idle,
    Busy,
}

/// Where a busy orchestrator currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BusyStage {
    Resolving,
    Encoding,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EncodeOutcome {
    Encoded {
        identifier: String,
        blob_id: String,
        bytes: usize,
        elapsed_ms: u64,
    },
    Failed {
        identifier: String,
        reason: String,
        elapsed_ms: u64,
    },
}

impl EncodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EncodeOutcome::Encoded { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            EncodeOutcome::Encoded { elapsed_ms, .. } | EncodeOutcome::Failed { elapsed_ms, .. } => {
                Duration::from_millis(*elapsed_ms)
            }
        }
    }
}

/// State published to observers after every transition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub state: EncodingState,
    pub stage: Option<BusyStage>,
    pub attempts: u64,
    pub last_outcome: Option<EncodeOutcome>,
}

impl Snapshot {
    pub fn idle() -> Self {
        Self {
            state: EncodingState::Idle,
            stage: None,
            attempts: 0,
            last_outcome: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state == EncodingState::Busy
    }
}

pub fn snapshot_channel() -> (watch::Sender<Snapshot>, watch::Receiver<Snapshot>) {
    watch::channel(Snapshot::idle())
}

#[derive(Clone, Debug)]
pub struct EncodeSummary {
    pub blob_id: String,
    pub encoded_len: usize,
}

/// The opaque long-running encode. Implementations run synchronously on the
/// calling thread.
pub trait Encoder: Send + Sync {
    fn encode(&self, payload: &[u8], identifier: &str) -> anyhow::Result<EncodeSummary>;
}

/// Erasure encoder backed by `blob_encoder`.
pub struct BlobEncoder {
    settings: Settings,
}

impl BlobEncoder {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Encoder for BlobEncoder {
    fn encode(&self, payload: &[u8], identifier: &str) -> anyhow::Result<EncodeSummary> {
        let blob = blob_encoder::encode(payload, identifier, &self.settings)?;
        Ok(EncodeSummary {
            encoded_len: blob.encoded_len(),
            blob_id: blob.blob_id,
        })
    }
}

/// Position of the script-driven animation, in degrees.
pub struct AnimationPhase {
    value: AtomicU32,
    step: u32,
}

impl AnimationPhase {
    pub fn new(step: u32) -> Self {
        Self {
            value: AtomicU32::new(0),
            step: step % 360,
        }
    }

    pub fn advance(&self) -> u32 {
        let next = (self.get() + self.step) % 360;
        self.value.store(next, Ordering::Relaxed);
        next
    }

    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }
}

pub struct Orchestrator {
    selector: Arc<FileSelector>,
    scheduler: Arc<PeriodicScheduler>,
    encoder: Arc<dyn Encoder>,
    phase: Arc<AnimationPhase>,
    animation_interval: Duration,
    state: watch::Sender<Snapshot>,
}

impl Orchestrator {
    pub fn new(
        selector: Arc<FileSelector>,
        scheduler: Arc<PeriodicScheduler>,
        encoder: Arc<dyn Encoder>,
        phase: Arc<AnimationPhase>,
        animation_interval: Duration,
        state: watch::Sender<Snapshot>,
    ) -> Self {
        Self {
            selector,
            scheduler,
            encoder,
            phase,
            animation_interval,
            state,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> &Arc<AnimationPhase> {
        &self.phase
    }

    /// Starts the animation for the initial idle state.
    pub fn activate(&self) {
        if !self.snapshot().is_busy() {
            self.resume_animation();
        }
    }

    fn resume_animation(&self) {
        let phase = Arc::clone(&self.phase);
        self.scheduler
            .start(ANIMATION_TASK, self.animation_interval, move || {
                phase.advance();
            });
    }

    /// Idle -> Busy, committed and published before the caller can await.
    fn begin(&self) -> DemoResult<BusyGuard<'_>> {
        let mut rejected = None;
        self.state.send_if_modified(|s| {
            if s.is_busy() {
                rejected = Some(s.state);
                return false;
            }
            s.state = EncodingState::Busy;
            s.stage = Some(BusyStage::Resolving);
            s.attempts += 1;
            true
        });
        if let Some(state) = rejected {
            log::debug!("Orchestrator: start_encoding rejected, already {:?}", state);
            return Err(DemoError::invalid("start_encoding", state));
        }

        self.scheduler.stop(ANIMATION_TASK);
        Ok(BusyGuard {
            orchestrator: self,
            done: false,
        })
    }

    fn set_stage(&self, stage: BusyStage) {
        self.state.send_modify(|s| s.stage = Some(stage));
    }

    fn finish(&self, outcome: EncodeOutcome) {
        self.state.send_modify(|s| {
            s.state = EncodingState::Idle;
            s.stage = None;
            s.last_outcome = Some(outcome);
        });
        self.resume_animation();
    }

    /// Runs one encode attempt on the current payload.
    ///
    /// Rejected with [`DemoError::InvalidTransition`] unless idle. Encoder
    /// failures are not errors here: they come back as
    /// [`EncodeOutcome::Failed`] once the machine is idle again.
    pub async fn start_encoding(&self) -> DemoResult<EncodeOutcome> {
        let mut guard = self.begin()?;

        let resolved = self.selector.current_payload().await;
        self.set_stage(BusyStage::Encoding);
        // let observers paint the busy indicator before the thread is taken
        tokio::task::yield_now().await;

        log::info!(
            "Orchestrator: encoding {} ({})",
            resolved.identifier,
            resolved.payload
        );
        let started = Instant::now();
        let result = self
            .encoder
            .encode(resolved.payload.data(), &resolved.identifier);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(summary) => {
                log::info!(
                    "Orchestrator: encoded {} as {} ({} bytes) in {}ms",
                    resolved.identifier,
                    summary.blob_id,
                    summary.encoded_len,
                    elapsed_ms
                );
                EncodeOutcome::Encoded {
                    identifier: resolved.identifier,
                    blob_id: summary.blob_id,
                    bytes: resolved.payload.len(),
                    elapsed_ms,
                }
            }
            Err(e) => {
                let err = DemoError::Encode(e);
                log::error!("Orchestrator: {} after {}ms", err, elapsed_ms);
                EncodeOutcome::Failed {
                    identifier: resolved.identifier,
                    reason: err.to_string(),
                    elapsed_ms,
                }
            }
        };

        guard.complete(outcome.clone());
        Ok(outcome)
    }
}

/// Returns the orchestrator to idle however the attempt ends, including a
/// dropped future or a panicking encoder.
struct BusyGuard<'a> {
    orchestrator: &'a Orchestrator,
    done: bool,
}

impl BusyGuard<'_> {
    fn complete(&mut self, outcome: EncodeOutcome) {
        self.done = true;
        self.orchestrator.finish(outcome);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        log::warn!("Orchestrator: encode attempt abandoned");
        self.orchestrator.finish(EncodeOutcome::Failed {
            identifier: String::new(),
            reason: "attempt abandoned".to_string(),
            elapsed_ms: 0,
        });
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
