//! End-to-end tests for encounter memory, healing, liveness and the
//! maintenance cycle, driven through the public handle.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use resonance_rs::model::{BreathingPattern, Classification};
use resonance_rs::{
    EntityId, EntityMetadata, ManualClock, MemoryStore, Resonance, ResonanceConfig,
};

async fn network() -> (Resonance<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    let net = Resonance::open_with_clock(MemoryStore::new(), ResonanceConfig::default(), clock.clone())
        .await
        .unwrap();
    (net, clock)
}

async fn register_all(net: &Resonance<MemoryStore>, texts: &[&str]) -> Vec<EntityId> {
    let mut ids = Vec::new();
    for t in texts {
        ids.push(net.register(t, EntityMetadata::named(*t)).await.unwrap().id);
    }
    ids
}

// ============================================================================
// 1. Encounter memory
// ============================================================================

#[tokio::test]
async fn test_encounter_history_is_capped() {
    let (net, clock) = network().await;
    let ids = register_all(&net, &["alpha", "beta"]).await;

    for i in 0..150 {
        clock.advance(Duration::seconds(1));
        net.engine().record_encounter(&ids[0], &ids[1], (i % 10) as f64 / 10.0).unwrap();
    }
    for id in &ids {
        let history = net.engine().encounters(id).unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history.last().unwrap().score, 0.9);
    }
}

#[tokio::test]
async fn test_healing_keeps_scores() {
    let (net, _) = network().await;
    let ids = register_all(&net, &["alpha", "beta"]).await;
    let engine = net.engine();

    engine.record_encounter(&ids[0], &ids[1], 0.12).unwrap();
    engine.record_encounter(&ids[0], &ids[1], 0.5).unwrap();
    engine.record_encounter(&ids[0], &ids[1], 0.25).unwrap();

    engine.heal_dissonance(&ids[1], &ids[0]).unwrap();
    let history = engine.encounters(&ids[0]).unwrap();
    let scores: Vec<f64> = history.iter().map(|e| e.score).collect();
    let classes: Vec<Classification> = history.iter().map(|e| e.classification).collect();
    assert_eq!(scores, vec![0.12, 0.5, 0.25]);
    assert_eq!(
        classes,
        vec![Classification::Recovered, Classification::Neutral, Classification::Recovered]
    );
}

#[tokio::test]
async fn test_heal_network_targets_most_dissonant() {
    let (net, _) = network().await;
    register_all(&net, &["a", "b", "c", "d", "e", "f", "g", "h"]).await;

    let pairs = net.engine().dissonant_pairs();
    let healed = net.heal_network(2).unwrap();
    assert_eq!(healed.len(), pairs.len().min(2));
    for (h, p) in healed.iter().zip(&pairs) {
        assert_eq!(h.pair, *p);
        // No encounters were recorded, so nothing to rewrite.
        assert_eq!(h.rewritten, 0);
    }
}

// ============================================================================
// 2. Liveness
// ============================================================================

#[tokio::test]
async fn test_registration_pulse_and_rhythm() {
    let (net, clock) = network().await;
    let ids = register_all(&net, &["alpha"]).await;
    let engine = net.engine();

    assert!(engine.is_alive_in_window(&ids[0]));
    for _ in 0..3 {
        clock.advance(Duration::hours(1));
        assert_eq!(engine.pulse(&ids[0], None).unwrap().resilience, 1.0);
    }
    assert_eq!(engine.breathing_pattern(&ids[0]), BreathingPattern::Steady);

    clock.advance(Duration::hours(2));
    assert!(!engine.is_alive_in_window(&ids[0]));
    let signs = engine.vital_signs(&ids[0]).unwrap().unwrap();
    assert!(!signs.alive);
}

// ============================================================================
// 3. Maintenance cycle
// ============================================================================

#[tokio::test]
async fn test_cycle_report() {
    let (net, clock) = network().await;
    let ids = register_all(&net, &["one", "two", "three", "four", "five", "six"]).await;

    clock.advance(Duration::hours(3));
    net.engine().pulse(&ids[0], None).unwrap();

    let report = net.cycle().await.unwrap();
    assert_eq!(report.dormant.len(), 5);
    assert!(!report.dormant.contains(&ids[0]));
    assert_eq!(report.vitality.total, 6);
    assert_eq!(report.vitality.alive, 1);
    assert!(report.formed.is_empty());
    assert!(report.healed.len() <= resonance_rs::HEALS_PER_CYCLE);
    for cluster in &report.clusters {
        assert!(cluster.members.len() >= 2);
        assert!(cluster.cohesion >= net.config().thresholds.harmonic - 1e-12);
    }
}

#[tokio::test]
async fn test_unbounded_interval_refused_at_open() {
    let mut config = ResonanceConfig::default();
    config.liveness.default_interval_secs = i64::MAX;
    let opened = Resonance::open(MemoryStore::new(), config).await;
    assert!(matches!(opened, Err(resonance_rs::Error::Validation(_))));
}
