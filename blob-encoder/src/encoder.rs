use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::shard::{self, Shard};

/// Shard layout used by [`encode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub primary: usize,
    pub secondary: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary: 10,
            secondary: 4,
        }
    }
}

impl Settings {
    pub fn new(primary: usize, secondary: usize) -> Self {
        Self { primary, secondary }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.primary == 0 {
            return Err(anyhow::anyhow!("at least one primary shard is required"));
        }
        match self.primary.checked_add(self.secondary) {
            Some(total) if total <= 255 => Ok(()),
            _ => Err(anyhow::anyhow!(
                "too many shards: {} + {} > 255",
                self.primary,
                self.secondary
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EncodedBlob {
    pub identifier: String,
    pub blob_id: String,
    pub unencoded_len: usize,
    pub shard_len: usize,
    pub shards: Vec<Shard>,
}

impl EncodedBlob {
    pub fn encoded_len(&self) -> usize {
        self.shard_len * self.shards.len()
    }
}

/// Encodes `payload` into primary and parity shards and derives its blob id.
///
/// Blocks the calling thread for the whole computation.
pub fn encode(payload: &[u8], identifier: &str, settings: &Settings) -> anyhow::Result<EncodedBlob> {
    settings.validate()?;
    if payload.is_empty() {
        return Err(anyhow::anyhow!("cannot encode empty blob {:?}", identifier));
    }

    let started = Instant::now();
    let shards = shard::build(payload, settings.primary, settings.secondary)?;
    let shard_len = shards.first().map(|s| s.data.len()).unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    for shard in &shards {
        hasher.update(shard.digest);
    }
    let blob_id = hex::encode(hasher.finalize());

    log::debug!(
        "blob {} ({} bytes) -> {} shards of {} bytes in {:?}",
        identifier,
        payload.len(),
        shards.len(),
        shard_len,
        started.elapsed()
    );

    Ok(EncodedBlob {
        identifier: identifier.to_string(),
        blob_id,
        unencoded_len: payload.len(),
        shard_len,
        shards,
    })
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
