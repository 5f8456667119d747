//! Shared doubles for unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};

use crate::{
    orchestrator::{EncodeSummary, Encoder},
    scheduler::PeriodicScheduler,
    source::types::AssetSource,
};

/// Asset source that serves fixed bytes or fails, optionally after a delay.
pub struct StubSource {
    result: Option<Bytes>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn ok(data: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            result: Some(Bytes::from_static(data)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(data: &'static [u8], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result: Some(Bytes::from_static(data)),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetSource for StubSource {
    fn describe(&self) -> String {
        "stub://asset".to_string()
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
        .boxed()
    }
}

/// What the encoder saw when it was called.
#[derive(Clone, Debug)]
pub struct EncodeCall {
    pub identifier: String,
    pub payload: Vec<u8>,
    pub animation_running: bool,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Encoder double recording every call and optionally failing or blocking.
pub struct RecordingEncoder {
    scheduler: Arc<PeriodicScheduler>,
    fail: bool,
    block: Duration,
    hook: Option<Hook>,
    calls: Mutex<Vec<EncodeCall>>,
}

impl RecordingEncoder {
    pub fn new(scheduler: Arc<PeriodicScheduler>) -> Self {
        Self {
            scheduler,
            fail: false,
            block: Duration::ZERO,
            hook: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Occupies the calling thread for `block` on every call.
    pub fn blocking(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Runs `hook` at the start of every call, before blocking.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Encoder for RecordingEncoder {
    fn encode(&self, payload: &[u8], identifier: &str) -> anyhow::Result<EncodeSummary> {
        self.calls.lock().unwrap().push(EncodeCall {
            identifier: identifier.to_string(),
            payload: payload.to_vec(),
            animation_running: self
                .scheduler
                .is_running(crate::config::ANIMATION_TASK),
        });
        if let Some(hook) = &self.hook {
            hook();
        }
        if !self.block.is_zero() {
            std::thread::sleep(self.block);
        }
        if self.fail {
            return Err(anyhow::anyhow!("encoder rejected {}", identifier));
        }
        Ok(EncodeSummary {
            blob_id: format!("stub-{}", payload.len()),
            encoded_len: payload.len(),
        })
    }
}
