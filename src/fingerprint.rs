//! Content → fingerprint.
//!
//! Turns an arbitrary text blob into a content-addressed identifier and a
//! small feature vector. The digest is SHA-256; the vector partitions the
//! 32 digest bytes into N equal big-endian segments, each scaled into [0, 1).
//! Output depends on the input bytes only, so the same text always lands on
//! the same entity.

use sha2::{Digest, Sha256};
use smallvec::SmallVec;

use crate::model::{EntityId, FeatureVector};
use crate::{Error, Result};

/// Identifier prefix; bumps if the digest or layout ever changes.
pub const ID_PREFIX: &str = "phash:v1:";

/// Digest bytes that make up the id (16 hex characters).
pub const ID_BYTES: usize = 8;

pub const MIN_DIMENSIONS: usize = 5;
pub const MAX_DIMENSIONS: usize = 8;
pub const DEFAULT_DIMENSIONS: usize = 8;

const DIGEST_BYTES: usize = 32;

/// Golden ratio, the weight of the first parent in `merge_vectors`.
pub const PHI: f64 = 1.618_033_988_749_895;

const NOTES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Result of fingerprinting a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub id: EntityId,
    /// Full hex-encoded digest.
    pub digest: String,
    pub vector: FeatureVector,
}

/// Deterministic text → (id, vector) extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureExtractor {
    dimensions: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self { dimensions: DEFAULT_DIMENSIONS }
    }
}

impl FeatureExtractor {
    pub fn new(dimensions: usize) -> Result<Self> {
        if !(MIN_DIMENSIONS..=MAX_DIMENSIONS).contains(&dimensions) {
            return Err(Error::Validation(format!(
                "feature dimensions must be in {MIN_DIMENSIONS}..={MAX_DIMENSIONS}, got {dimensions}"
            )));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Fingerprint `text`. Never fails; the empty string hashes like any other.
    pub fn compute(&self, text: &str) -> Fingerprint {
        let digest: [u8; DIGEST_BYTES] = Sha256::digest(text.as_bytes()).into();
        Fingerprint {
            id: EntityId(format!("{ID_PREFIX}{}", hex::encode(&digest[..ID_BYTES]))),
            digest: hex::encode(digest),
            vector: self.vectorize(&digest),
        }
    }

    fn vectorize(&self, digest: &[u8; DIGEST_BYTES]) -> FeatureVector {
        let segment = DIGEST_BYTES / self.dimensions;
        // 2^(8·segment); segment ≤ 6 bytes keeps every value exact in an f64.
        let scale = (1u64 << (8 * segment)) as f64;
        digest
            .chunks_exact(segment)
            .take(self.dimensions)
            .map(|chunk| {
                let value = chunk.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
                value as f64 / scale
            })
            .collect()
    }
}

/// Fingerprint with the default extractor.
pub fn compute_fingerprint(text: &str) -> Fingerprint {
    FeatureExtractor::default().compute(text)
}

/// Decorative chord-style label for a vector, e.g. `"F#maj7"`.
///
/// Root note from the first component, quality from the sign of the component sum.
pub fn chord_label(vector: &[f64]) -> String {
    let root = vector
        .first()
        .map(|v| ((v * 12.0).abs().floor() as usize) % NOTES.len())
        .unwrap_or(0);
    let quality = if vector.iter().sum::<f64>() > 0.0 { "maj7" } else { "m7" };
    format!("{}{}", NOTES[root], quality)
}

/// Weighted combination of two parent vectors plus one emergent component.
///
/// Per index: when both components are non-zero, the mean of their harmonic
/// mean and their golden-ratio weighted mean; otherwise whichever is present.
/// The appended component is the mean of the merged values times φ, so the
/// output has `max(a.len(), b.len()) + 1` components.
pub fn merge_vectors(a: &[f64], b: &[f64]) -> FeatureVector {
    let len = a.len().max(b.len());
    let mut merged: FeatureVector = SmallVec::with_capacity(len + 1);

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0.0);
        let y = b.get(i).copied().unwrap_or(0.0);
        let value = if x != 0.0 && y != 0.0 {
            let golden = (x * PHI + y) / (PHI + 1.0);
            let sum = x + y;
            if sum != 0.0 {
                let harmonic = 2.0 * x * y / sum;
                (harmonic + golden) / 2.0
            } else {
                golden
            }
        } else if x != 0.0 {
            x
        } else {
            y
        };
        merged.push(value);
    }

    let emergent = if merged.is_empty() {
        0.0
    } else {
        merged.iter().sum::<f64>() / merged.len() as f64
    };
    merged.push(emergent * PHI);
    merged
}
