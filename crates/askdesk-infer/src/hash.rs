//! Deterministic feature-hashing embedder.
//!
//! Each alphanumeric run of the input contributes the whole run plus its
//! character bigrams. Features are hashed (FNV-1a) into signed buckets and
//! the result is L2-normalized. Texts sharing words or CJK bigrams get a
//! positive cosine; unrelated texts land near zero.

use askdesk_core::Result;
use async_trait::async_trait;

use crate::embedder::Embedder;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Weight of a character bigram relative to a whole-run feature.
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for run in alphanumeric_runs(text) {
            self.add_feature(&mut vec, &run, 1.0);
            let chars: Vec<char> = run.chars().collect();
            if chars.len() > 1 {
                for pair in chars.windows(2) {
                    let bigram: String = pair.iter().collect();
                    self.add_feature(&mut vec, &bigram, BIGRAM_WEIGHT);
                }
            }
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dim as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

fn alphanumeric_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
