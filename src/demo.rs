use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    compositor::OffThreadTicker,
    config::DemoConfig,
    orchestrator::{
        AnimationPhase, BlobEncoder, EncodeOutcome, Encoder, Orchestrator, snapshot_channel,
    },
    scheduler::PeriodicScheduler,
    source::{
        preload::Preloader,
        selector::FileSelector,
        types::{AssetSource, PayloadOrigin, asset_source},
    },
    surface::{
        FrameClock, FrameInputs, InputSender, ResponsivenessReport, Surfaces, UserInput, render,
        spawn_dispatcher,
    },
};

const TYPED: &str = "hello while encoding ";

#[derive(Clone, Debug, Serialize)]
pub struct RoundReport {
    pub round: u32,
    pub outcome: EncodeOutcome,
    /// Ticks the off-thread ticker fired while the encode held the runtime.
    pub compositor_ticks: u64,
    pub max_frame_gap_ms: u64,
    pub input: ResponsivenessReport,
}

#[derive(Clone, Debug, Serialize)]
pub struct DemoReport {
    pub asset: String,
    pub origin: Option<PayloadOrigin>,
    pub selection: String,
    pub rounds: Vec<RoundReport>,
    pub rejected_clicks: u64,
    pub counter: i64,
    pub text: String,
    pub frames: u64,
}

/// All components wired together for one run.
pub struct Demo {
    config: DemoConfig,
    source: Arc<dyn AssetSource>,
    preloader: Arc<Preloader>,
    selector: Arc<FileSelector>,
    scheduler: Arc<PeriodicScheduler>,
    orchestrator: Arc<Orchestrator>,
    surfaces: Arc<Surfaces>,
    frames: Arc<FrameClock>,
}

impl Demo {
    pub fn new(config: DemoConfig) -> anyhow::Result<Self> {
        let source = asset_source(&config.asset, config.fetch_timeout)?;
        let encoder = Arc::new(BlobEncoder::new(config.encoder));
        Self::with_parts(config, source, encoder)
    }

    pub fn with_parts(
        config: DemoConfig,
        source: Arc<dyn AssetSource>,
        encoder: Arc<dyn Encoder>,
    ) -> anyhow::Result<Self> {
        let scheduler = Arc::new(PeriodicScheduler::new()?);
        let preloader = Arc::new(Preloader::new(
            Arc::clone(&source),
            config.fallback_size,
            config.fallback_seed,
        ));
        let (state_tx, state_rx) = snapshot_channel();
        let selector = Arc::new(FileSelector::new(
            Arc::clone(&preloader),
            state_rx,
            config.default_display_name.clone(),
            config.default_identifier.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&selector),
            Arc::clone(&scheduler),
            encoder,
            Arc::new(AnimationPhase::new(config.phase_step)),
            config.animation_interval,
            state_tx,
        ));

        Ok(Self {
            config,
            source,
            preloader,
            selector,
            scheduler,
            orchestrator,
            surfaces: Arc::new(Surfaces::default()),
            frames: Arc::new(FrameClock::default()),
        })
    }

    pub fn selector(&self) -> &Arc<FileSelector> {
        &self.selector
    }

    pub fn scheduler(&self) -> &Arc<PeriodicScheduler> {
        &self.scheduler
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Runs the configured encode rounds, then tears everything down.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<DemoReport> {
        let preloader = Arc::clone(&self.preloader);
        let preload = tokio::spawn(async move {
            preloader.preload().await;
        });

        if let Some(path) = &self.config.selected_file {
            self.selector.select_path(path).await?;
        }

        let tasks = cancel.child_token();
        self.orchestrator.activate();
        let (input, dispatcher) = spawn_dispatcher(Arc::clone(&self.surfaces), tasks.clone());
        let renderer = self.spawn_renderer(tasks.clone());
        let driver = spawn_input_driver(input, self.config.input_interval, tasks.clone())?;
        let mut compositor = OffThreadTicker::spawn(self.config.animation_interval)?;

        let mut rounds = Vec::new();
        let mut rejected_clicks = 0;
        for round in 1..=self.config.rounds {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.warmup) => {},
            }
            self.frames.take_max_gap();
            self.surfaces.responsiveness.take();

            let compositor_before = compositor.ticks();
            // a second click lands while the first is still resolving
            let (outcome, second) = tokio::join!(self.orchestrator.start_encoding(), async {
                tokio::task::yield_now().await;
                self.orchestrator.start_encoding().await
            });
            let compositor_ticks = compositor.ticks() - compositor_before;
            if second.is_err() {
                rejected_clicks += 1;
            }
            let outcome = outcome?;

            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = tokio::time::sleep(self.config.cooldown) => {},
            }

            let report = RoundReport {
                round,
                outcome,
                compositor_ticks,
                max_frame_gap_ms: self.frames.take_max_gap().as_millis() as u64,
                input: self.surfaces.responsiveness.take(),
            };
            log::info!(
                "Demo: round {} took {:?}; frames stalled {}ms, input stalled {}ms, compositor ticked {} times",
                round,
                report.outcome.elapsed(),
                report.max_frame_gap_ms,
                report.input.max_latency_ms,
                report.compositor_ticks
            );
            rounds.push(report);
        }

        tasks.cancel();
        compositor.stop();
        self.scheduler.shutdown();
        preload.abort();
        if let Err(e) = dispatcher.await {
            log::warn!("Demo: input dispatcher failed: {}", e);
        }
        if let Err(e) = renderer.await {
            log::warn!("Demo: renderer failed: {}", e);
        }
        if driver.join().is_err() {
            log::warn!("Demo: input driver panicked");
        }

        Ok(DemoReport {
            asset: self.source.describe(),
            origin: self.preloader.origin(),
            selection: self.selector.display_name(),
            rounds,
            rejected_clicks,
            counter: self.surfaces.counter.get(),
            text: self.surfaces.text.get(),
            frames: self.frames.frames(),
        })
    }

    fn spawn_renderer(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let selector = Arc::clone(&self.selector);
        let surfaces = Arc::clone(&self.surfaces);
        let frames = Arc::clone(&self.frames);
        let period = self.config.render_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        frames.record(Instant::now());
                        let snapshot = orchestrator.snapshot();
                        let selection = selector.selection();
                        let echo = surfaces.text.echo();
                        let line = render(&FrameInputs {
                            snapshot: &snapshot,
                            selection: &selection,
                            counter: surfaces.counter.get(),
                            echo: &echo,
                            phase: orchestrator.phase().get(),
                        });
                        log::info!("{}", line);
                    },
                }
            }
        })
    }
}

/// Simulated user on its own thread: keeps clicking and typing whether or
/// not the runtime is free to handle it.
fn spawn_input_driver(
    input: InputSender,
    period: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("input-driver".to_string())
        .spawn(move || {
            let mut typed = TYPED.chars().cycle();
            let mut n: u64 = 0;
            while !cancel.is_cancelled() {
                std::thread::sleep(period);
                let event = match n % 4 {
                    0 | 2 => UserInput::Increase,
                    1 => typed.next().map(UserInput::Type).unwrap_or(UserInput::Backspace),
                    _ => UserInput::Decrease,
                };
                if !input.send(event) {
                    break;
                }
                n += 1;
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
#[path = "demo_test.rs"]
mod demo_test;
