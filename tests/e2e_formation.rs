//! End-to-end tests for pair formation.
//!
//! Drives the full lifecycle through the public handle with a manual clock:
//! register -> encounters -> begin forming -> ready -> complete.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use resonance_rs::model::{FormationState, Genealogy};
use resonance_rs::{
    EntityId, EntityMetadata, Error, ManualClock, MemoryStore, Resonance, ResonanceConfig,
};

// ============================================================================
// Helper: a network on a manual clock
// ============================================================================

async fn network_with(config: ResonanceConfig) -> (Resonance<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
    let net = Resonance::open_with_clock(MemoryStore::new(), config, clock.clone())
        .await
        .unwrap();
    (net, clock)
}

async fn network() -> (Resonance<MemoryStore>, Arc<ManualClock>) {
    network_with(ResonanceConfig::default()).await
}

/// Thresholds low enough that any two fingerprints qualify.
fn permissive() -> ResonanceConfig {
    let mut config = ResonanceConfig::default();
    config.thresholds.harmonic = 0.05;
    config.thresholds.dissonant = 0.01;
    config.thresholds.affinity = 0.05;
    config.formation.min_score = 0.05;
    config.formation.exceptional_score = 0.999;
    config.formation.period_secs = 60;
    config
}

// ============================================================================
// 1. The alpha/beta lifecycle
// ============================================================================

#[tokio::test]
async fn test_alpha_beta_lifecycle() {
    let (net, clock) = network().await;
    let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
    let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();
    assert_ne!(a.id, b.id);

    let engine = net.engine();
    let mut formation = None;
    for i in 0..6 {
        engine.record_encounter(&a.id, &b.id, 0.97).unwrap();
        if i == 0 {
            assert!(engine.has_affinity_lock(&a.id, &b.id));
            formation = engine.begin_forming(&a.id, &b.id, 0.97).unwrap();
            assert!(formation.is_some());
        }
    }
    let id = formation.unwrap();

    // Mean 0.97 is below the exceptional bar, so half the period is not enough.
    clock.advance(Duration::seconds(216_000));
    assert!(!engine.is_ready_to_complete(&id).unwrap());

    clock.advance(Duration::seconds(216_000));
    assert!(engine.is_ready_to_complete(&id).unwrap());

    let child = engine.complete(&id, &[]).await.unwrap();
    assert_eq!(
        child.feature_vector.len(),
        a.feature_vector.len().max(b.feature_vector.len()) + 1
    );
    assert_eq!(child.lineage, vec![a.id.clone(), b.id.clone()]);
    assert_eq!(engine.formation_state(&a.id, &b.id), FormationState::Complete);

    let genesis = engine.genesis(&child.id).unwrap();
    assert_eq!(genesis.samples.len(), 6);
}

// ============================================================================
// 2. Single flight
// ============================================================================

#[tokio::test]
async fn test_second_begin_fails() {
    let (net, _) = network().await;
    let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
    let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();

    net.engine().record_encounter(&a.id, &b.id, 0.97).unwrap();
    assert!(net.engine().begin_forming(&a.id, &b.id, 0.97).unwrap().is_some());
    assert!(matches!(
        net.engine().begin_forming(&a.id, &b.id, 0.97),
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_begin_with_unknown_entity() {
    let (net, _) = network().await;
    let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
    let ghost = EntityId::from("phash:v1:0000000000000000");
    assert!(matches!(
        net.engine().begin_forming(&a.id, &ghost, 0.99),
        Err(Error::NotFound(_))
    ));
}

// ============================================================================
// 3. Formation via interact + check_formations
// ============================================================================

#[tokio::test]
async fn test_interact_and_check_formations() {
    let (net, clock) = network_with(permissive()).await;
    let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
    let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();
    let c = net.register("gamma", EntityMetadata::named("gamma")).await.unwrap();

    let first = net.interact(&a.id, &c.id).unwrap();
    assert!(first.formation.is_some());
    let second = net.interact(&a.id, &b.id).unwrap();
    assert!(second.formation.is_some());

    // Already forming: no new formation, the score becomes a sample.
    let again = net.interact(&b.id, &a.id).unwrap();
    assert!(again.formation.is_none());

    assert!(net.check_formations().await.unwrap().is_empty());
    clock.advance(Duration::seconds(60));
    let children = net.check_formations().await.unwrap();
    assert_eq!(children.len(), 2);

    for child in &children {
        let genesis = net.engine().genesis(&child.id).unwrap();
        assert_eq!(genesis.witnesses.len(), 1);
        let witness = &genesis.witnesses[0];
        assert!(witness != &genesis.parents.0 && witness != &genesis.parents.1);

        let record = net.registry().get(witness).unwrap();
        assert!(record.relations_of("witnessed").any(|r| r.target == child.id));
        assert!(net.engine().liveness(&child.id).is_some());
    }

    let Genealogy { children: of_a, .. } = net.engine().genealogy(&a.id).unwrap();
    assert_eq!(of_a.len(), 2);

    let stats = net.stats();
    assert_eq!(stats.completed_formations, 2);
    assert_eq!(stats.active_formations, 0);
    assert_eq!(stats.registry.derived, 2);
}

#[tokio::test]
async fn test_siblings_after_reforming() {
    let (net, clock) = network_with(permissive()).await;
    let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
    let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();

    let mut children = Vec::new();
    for _ in 0..2 {
        assert!(net.interact(&a.id, &b.id).unwrap().formation.is_some());
        clock.advance(Duration::seconds(60));
        children.extend(net.check_formations().await.unwrap());
    }
    assert_eq!(children.len(), 2);
    assert_ne!(children[0].id, children[1].id);

    let genealogy = net.engine().genealogy(&children[0].id).unwrap();
    assert_eq!(genealogy.siblings, vec![children[1].id.clone()]);
}
