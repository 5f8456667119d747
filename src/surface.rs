//! Interaction surfaces: the counter, the text echo and the animated ball.
//!
//! None of these look at orchestrator state to decide whether to respond.
//! They respond whenever the runtime polls them, which is exactly what the
//! demo measures.

use std::{
    f64::consts::PI,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    orchestrator::{EncodingState, Snapshot},
    source::{selector::SelectionInfo, types::mebibytes},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserInput {
    Increase,
    Decrease,
    Type(char),
    Backspace,
}

#[derive(Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct TextEcho(Mutex<String>);

impl TextEcho {
    fn text(&self) -> MutexGuard<'_, String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> String {
        self.text().clone()
    }

    /// What the echo line shows.
    pub fn echo(&self) -> String {
        let text = self.text();
        if text.is_empty() {
            "nothing yet".to_string()
        } else {
            text.clone()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResponsivenessReport {
    pub dispatched: u64,
    pub max_latency_ms: u64,
    pub last_latency_ms: u64,
}

/// Dispatch latency of user input: time sent to time applied.
#[derive(Default)]
pub struct Responsiveness {
    dispatched: AtomicU64,
    max_latency_us: AtomicU64,
    last_latency_us: AtomicU64,
}

impl Responsiveness {
    fn record(&self, latency: Duration) {
        let us = latency.as_micros() as u64;
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.last_latency_us.store(us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.max_latency_us.load(Ordering::Relaxed))
    }

    /// Returns the report and starts a new window. Both the dispatch count
    /// and the max latency restart from zero.
    pub fn take(&self) -> ResponsivenessReport {
        ResponsivenessReport {
            dispatched: self.dispatched.swap(0, Ordering::Relaxed),
            max_latency_ms: self.max_latency_us.swap(0, Ordering::Relaxed) / 1000,
            last_latency_ms: self.last_latency_us.load(Ordering::Relaxed) / 1000,
        }
    }

    pub fn report(&self) -> ResponsivenessReport {
        ResponsivenessReport {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            max_latency_ms: self.max_latency_us.load(Ordering::Relaxed) / 1000,
            last_latency_ms: self.last_latency_us.load(Ordering::Relaxed) / 1000,
        }
    }
}

#[derive(Default)]
pub struct Surfaces {
    pub counter: Counter,
    pub text: TextEcho,
    pub responsiveness: Responsiveness,
}

impl Surfaces {
    pub fn apply(&self, input: &UserInput) {
        match input {
            UserInput::Increase => self.counter.add(1),
            UserInput::Decrease => self.counter.add(-1),
            UserInput::Type(c) => self.text.text().push(*c),
            UserInput::Backspace => {
                self.text.text().pop();
            }
        }
    }
}

/// Sending half of the input queue. Cheap to clone and usable from any thread.
#[derive(Clone)]
pub struct InputSender {
    tx: mpsc::UnboundedSender<(UserInput, Instant)>,
}

impl InputSender {
    /// Queues `input`. Returns false once the dispatcher is gone.
    pub fn send(&self, input: UserInput) -> bool {
        self.tx.send((input, Instant::now())).is_ok()
    }
}

/// Spawns the task that applies queued input to `surfaces`.
pub fn spawn_dispatcher(
    surfaces: Arc<Surfaces>,
    cancel: CancellationToken,
) -> (InputSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<(UserInput, Instant)>();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                },
                msg = rx.recv() => {
                    let Some((input, sent_at)) = msg else { break };
                    surfaces.apply(&input);
                    surfaces.responsiveness.record(sent_at.elapsed());
                },
            }
        }
        log::debug!("Dispatcher: stopped");
    });
    (InputSender { tx }, handle)
}

/// Largest gap between consecutive rendered frames.
#[derive(Default)]
pub struct FrameClock {
    inner: Mutex<FrameClockInner>,
}

#[derive(Default)]
struct FrameClockInner {
    last: Option<Instant>,
    frames: u64,
    max_gap: Duration,
}

impl FrameClock {
    fn inner(&self) -> MutexGuard<'_, FrameClockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, now: Instant) {
        let mut inner = self.inner();
        if let Some(last) = inner.last {
            let gap = now.saturating_duration_since(last);
            inner.max_gap = inner.max_gap.max(gap);
        }
        inner.last = Some(now);
        inner.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.inner().frames
    }

    /// Returns the largest gap so far and starts a new window.
    pub fn take_max_gap(&self) -> Duration {
        std::mem::take(&mut self.inner().max_gap)
    }
}

/// Everything a frame is rendered from.
pub struct FrameInputs<'a> {
    pub snapshot: &'a Snapshot,
    pub selection: &'a SelectionInfo,
    pub counter: i64,
    pub echo: &'a str,
    pub phase: u32,
}

pub fn badge(state: EncodingState) -> &'static str {
    match state {
        EncodingState::Idle => "Active",
        EncodingState::Busy => "Paused",
    }
}

pub fn button_label(state: EncodingState) -> &'static str {
    match state {
        EncodingState::Idle => "Start Encoding",
        EncodingState::Busy => "Encoding in Progress",
    }
}

/// Ball offset in pixels for an animation phase in degrees.
pub fn ball_position(phase: u32) -> (f64, f64) {
    let p = phase as f64;
    let x = (p * PI / 90.0).sin() * 140.0 + 140.0 + (p * PI / 45.0).sin() * 30.0;
    let y = (p * PI / 120.0).sin() * 35.0 + 40.0 + (p * PI / 60.0).cos() * 15.0;
    (x, y)
}

pub fn render(frame: &FrameInputs<'_>) -> String {
    let state = frame.snapshot.state;
    let file = match frame.selection.size {
        Some(size) => format!("{} ({:.2} MB)", frame.selection.name, mebibytes(size)),
        None => frame.selection.name.clone(),
    };
    let (x, y) = ball_position(frame.phase);
    format!(
        "[{}] file: {} | counter[{}]: {} | input[{}]: {} | ball[{}]: ({:.0}, {:.0})",
        button_label(state),
        file,
        badge(state),
        frame.counter,
        badge(state),
        frame.echo,
        badge(state),
        x,
        y
    )
}

#[cfg(test)]
#[path = "surface_test.rs"]
mod surface_test;
