use sha2::{Digest, Sha256};

use crate::gf;

/// One encoded shard and its digest.
#[derive(Clone, Debug)]
pub struct Shard {
    pub index: usize,
    pub data: Vec<u8>,
    pub digest: [u8; 32],
}

impl Shard {
    fn new(index: usize, data: Vec<u8>) -> Self {
        let digest = Sha256::digest(&data).into();
        Self {
            index,
            data,
            digest,
        }
    }

    pub fn is_parity(&self, primary: usize) -> bool {
        self.index >= primary
    }
}

/// Splits `payload` into `count` equally sized shards, zero padding the tail.
pub fn split(payload: &[u8], count: usize) -> Vec<Vec<u8>> {
    let shard_len = payload.len().div_ceil(count);
    let mut shards = Vec::with_capacity(count);
    for i in 0..count {
        let start = (i * shard_len).min(payload.len());
        let end = ((i + 1) * shard_len).min(payload.len());
        let mut shard = Vec::with_capacity(shard_len);
        shard.extend_from_slice(&payload[start..end]);
        shard.resize(shard_len, 0);
        shards.push(shard);
    }
    shards
}

/// Computes `rows` parity shards over `data` with a Cauchy matrix.
pub fn parity(data: &[Vec<u8>], rows: usize) -> anyhow::Result<Vec<Vec<u8>>> {
    let shard_len = data.first().map(|s| s.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut acc = vec![0u8; shard_len];
        for (col, shard) in data.iter().enumerate() {
            let c = gf::cauchy(row, col, rows)
                .ok_or_else(|| anyhow::anyhow!("degenerate coefficient at ({}, {})", row, col))?;
            let table = gf::mul_table(c);
            for (a, b) in acc.iter_mut().zip(shard.iter()) {
                *a ^= table[*b as usize];
            }
        }
        out.push(acc);
    }
    Ok(out)
}

/// Splits, computes parity and digests every shard. Primary shards come first.
pub fn build(payload: &[u8], primary: usize, secondary: usize) -> anyhow::Result<Vec<Shard>> {
    let data = split(payload, primary);
    let parity = parity(&data, secondary)?;
    Ok(data
        .into_iter()
        .chain(parity)
        .enumerate()
        .map(|(i, d)| Shard::new(i, d))
        .collect())
}
