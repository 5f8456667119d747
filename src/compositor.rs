use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use tokio_util::sync::CancellationToken;

/// Ticks on its own OS thread, outside the runtime, the way a compositor
/// keeps transform/opacity animations moving while script is blocked.
pub struct OffThreadTicker {
    ticks: Arc<AtomicU64>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl OffThreadTicker {
    pub fn spawn(period: Duration) -> anyhow::Result<Self> {
        let ticks = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        let ticks_clone = Arc::clone(&ticks);
        let cancel_clone = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("compositor".to_string())
            .spawn(move || {
                loop {
                    if cancel_clone.is_cancelled() {
                        break;
                    }
                    std::thread::sleep(period);
                    ticks_clone.fetch_add(1, Ordering::Relaxed);
                }
            })?;

        Ok(Self {
            ticks,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Compositor: ticker thread panicked");
            }
        }
    }
}

impl Drop for OffThreadTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
