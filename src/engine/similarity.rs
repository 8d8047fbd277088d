//! Pure scoring: similarity, classification, dissonance ranking and greedy
//! threshold clustering. Nothing here touches engine state.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::model::{Classification, Entity, EntityId};

/// Absolute cosine similarity over the common prefix of `a` and `b`.
///
/// The result is symmetric bit-for-bit and lies in `[0, 1]`. Zero magnitude
/// on either side, or any non-finite intermediate, yields `0.0`.
///
/// Anti-correlated vectors score as high as correlated ones.
pub fn similarity(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    // Components are scaled by each side's largest magnitude so the sums
    // neither overflow nor underflow.
    let (scale_a, scale_b) = (max_magnitude(a), max_magnitude(b));
    if scale_a == 0.0 || scale_b == 0.0 || !scale_a.is_finite() || !scale_b.is_finite() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot.abs() / (norm_a * norm_b).sqrt();
    if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

/// Largest absolute component; NaN if any component is NaN.
fn max_magnitude(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| if x.is_nan() || m.is_nan() { f64::NAN } else { m.max(x.abs()) })
}

impl ThresholdConfig {
    /// `Similar` at or above `harmonic`, `Dissimilar` at or below `dissonant`.
    pub fn classify(&self, score: f64) -> Classification {
        if score >= self.harmonic {
            Classification::Similar
        } else if score <= self.dissonant {
            Classification::Dissimilar
        } else {
            Classification::Neutral
        }
    }

    pub fn is_affinity(&self, score: f64) -> bool {
        score >= self.affinity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissonantPair {
    pub a: EntityId,
    pub b: EntityId,
    pub score: f64,
    /// `1 - score`
    pub dissonance: f64,
}

/// Every pair classified `Dissimilar`, most dissonant first. Ties keep input order.
pub fn detect_dissonance(entities: &[Entity], thresholds: &ThresholdConfig) -> Vec<DissonantPair> {
    let mut pairs = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            let score = similarity(&a.feature_vector, &b.feature_vector);
            if thresholds.classify(score) == Classification::Dissimilar {
                pairs.push(DissonantPair {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    score,
                    dissonance: 1.0 - score,
                });
            }
        }
    }
    pairs.sort_by(|x, y| y.dissonance.total_cmp(&x.dissonance));
    pairs
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<EntityId>,
    /// Mean pairwise similarity among members.
    pub cohesion: f64,
}

/// Greedy threshold clustering.
///
/// Walks `entities` in order; each unvisited entity seeds a cluster, and every
/// later unvisited candidate joins when its mean similarity to the current
/// members is at least `min_score`. The result depends on input order and is
/// not globally optimal. Seeds that attract nobody are dropped.
///
/// Because every join adds pairs averaging at least `min_score`, each
/// returned cluster's cohesion is at least `min_score`.
pub fn find_clusters(entities: &[Entity], min_score: f64) -> Vec<Cluster> {
    let mut visited = vec![false; entities.len()];
    let mut clusters = Vec::new();

    for seed in 0..entities.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut members = vec![seed];

        for candidate in seed + 1..entities.len() {
            if visited[candidate] {
                continue;
            }
            let total: f64 = members
                .iter()
                .map(|&m| similarity(&entities[m].feature_vector, &entities[candidate].feature_vector))
                .sum();
            if total / members.len() as f64 >= min_score {
                visited[candidate] = true;
                members.push(candidate);
            }
        }

        if members.len() > 1 {
            let group: Vec<&Entity> = members.iter().map(|&m| &entities[m]).collect();
            clusters.push(Cluster {
                cohesion: cohesion(&group),
                members: group.iter().map(|e| e.id.clone()).collect(),
            });
        }
    }
    clusters
}

fn cohesion(group: &[&Entity]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in group.iter().enumerate() {
        for b in &group[i + 1..] {
            total += similarity(&a.feature_vector, &b.feature_vector);
            pairs += 1;
        }
    }
    if pairs == 0 { 1.0 } else { total / pairs as f64 }
}

/// Scores of a set of entities relative to one center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonanceField {
    pub center: EntityId,
    /// Every other entity and its score, in input order.
    pub scores: Vec<(EntityId, f64)>,
    /// Mean of `scores`, zero when empty.
    pub mean: f64,
}

pub fn resonance_field(center: &Entity, entities: &[Entity]) -> ResonanceField {
    let scores: Vec<(EntityId, f64)> = entities
        .iter()
        .filter(|e| e.id != center.id)
        .map(|e| (e.id.clone(), similarity(&center.feature_vector, &e.feature_vector)))
        .collect();
    let mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64
    };
    ResonanceField { center: center.id.clone(), scores, mean }
}
