use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{
    error::DemoError,
    source::types::{AssetSource, Payload, PayloadOrigin},
};

#[derive(Clone, Debug)]
struct Preloaded {
    payload: Payload,
    origin: PayloadOrigin,
}

/// Loads the default payload once and caches it for the process lifetime.
///
/// Every failure resolves to a generated fallback of `fallback_size` bytes,
/// and the fallback is cached like a fetched asset would be.
pub struct Preloader {
    source: Arc<dyn AssetSource>,
    fallback_size: usize,
    fallback_seed: u64,
    cell: OnceCell<Preloaded>,
}

impl Preloader {
    pub fn new(source: Arc<dyn AssetSource>, fallback_size: usize, fallback_seed: u64) -> Self {
        Self {
            source,
            fallback_size,
            fallback_seed,
            cell: OnceCell::new(),
        }
    }

    /// Returns the default payload, loading it on first use.
    ///
    /// Concurrent callers share a single in-flight load.
    pub async fn preload(&self) -> Payload {
        self.cell.get_or_init(|| self.load()).await.payload.clone()
    }

    /// The payload if a load already completed.
    pub fn cached(&self) -> Option<Payload> {
        self.cell.get().map(|p| p.payload.clone())
    }

    pub fn origin(&self) -> Option<PayloadOrigin> {
        self.cell.get().map(|p| p.origin)
    }

    async fn load(&self) -> Preloaded {
        let target = self.source.describe();
        log::info!("Preloader: fetching default asset {}", target);

        let fetched = match self.source.fetch().await {
            Ok(bytes) if bytes.is_empty() => Err(anyhow::anyhow!("{} returned no data", target)),
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(bytes) => {
                let payload = Payload::new(bytes);
                log::info!("Preloader: loaded {} ({})", target, payload);
                Preloaded {
                    payload,
                    origin: PayloadOrigin::Fetched,
                }
            }
            Err(e) => {
                log::warn!(
                    "Preloader: {}; generating {} byte fallback",
                    DemoError::Fetch(e),
                    self.fallback_size
                );
                Preloaded {
                    payload: Payload::generate(self.fallback_size, self.fallback_seed),
                    origin: PayloadOrigin::Fallback,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "preload_test.rs"]
mod preload_test;
