use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::config::AssetLocation;

/// Immutable payload bytes. Clones share the same buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    data: Bytes,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Deterministic pseudo-random payload used when the default asset is unavailable.
    pub fn generate(size: usize, seed: u64) -> Self {
        let mut data = vec![0u8; size];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        Self::new(data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload {{ len: {} }}", self.data.len())
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{:.2} MB", mebibytes(self.data.len()))
    }
}

pub fn mebibytes(len: usize) -> f64 {
    len as f64 / (1024.0 * 1024.0)
}

/// How the preloaded payload was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PayloadOrigin {
    Fetched,
    Fallback,
}

/// Location of the default asset.
pub trait AssetSource: Send + Sync {
    fn describe(&self) -> String;

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Bytes>>;
}

pub struct HttpAssetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpAssetSource {
    /// `timeout` bounds the whole request, so a server that never answers
    /// ends up on the fallback path.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl AssetSource for HttpAssetSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Bytes>> {
        async move {
            let response = self.client.get(&self.url).send().await?.error_for_status()?;
            Ok(response.bytes().await?)
        }
        .boxed()
    }
}

pub struct FileAssetSource {
    path: PathBuf,
}

impl FileAssetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AssetSource for FileAssetSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Bytes>> {
        async move {
            let data = tokio::fs::read(&self.path).await?;
            Ok(Bytes::from(data))
        }
        .boxed()
    }
}

pub fn asset_source(
    location: &AssetLocation,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn AssetSource>> {
    let source: Arc<dyn AssetSource> = match location {
        AssetLocation::Http { .. } => Arc::new(HttpAssetSource::new(location.describe(), timeout)?),
        AssetLocation::File { path } => Arc::new(FileAssetSource::new(path.clone())),
    };
    Ok(source)
}
