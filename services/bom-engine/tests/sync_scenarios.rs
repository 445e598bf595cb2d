//! BOM engine scenario tests
//!
//! End-to-end flows through the session and the sync orchestrator against an
//! in-memory ERP snapshot.

use bomsync_engine::{
    AlternateChoice, BomError, BomEvent, BomSession, BomTree, DiffType, ItemStatus, NodeId, PartAttributes, Severity,
    StaticSnapshotProvider, SyncOrchestrator, SyncProgress, SyncState,
};
use bomsync_utils::EngineConfig;
use pretty_assertions::assert_eq;

struct Fixture {
    tree: BomTree,
    group: NodeId,
    cpu_a: NodeId,
    cpu_b: NodeId,
}

/// Server BOM with a CPU-A primary and an inactive CPU-B alternate.
fn server_bom() -> Fixture {
    let mut tree = BomTree::with_root("Server");
    let mut group = tree.root().unwrap();
    for label in ["Compute", "Board", "Processors", "CPU socket"] {
        group = tree.add_container(group, label).unwrap();
    }
    let cpu_a = tree
        .add_part(group, PartAttributes::new("CPU-A", "Xeon 6430", 2599.0).with_supplier("Intel"))
        .unwrap();
    let cpu_b = tree
        .add_part(
            cpu_a,
            PartAttributes::new("CPU-B", "EPYC 9124", 1899.0)
                .with_supplier("AMD")
                .with_status(ItemStatus::Inactive),
        )
        .unwrap();
    Fixture { tree, group, cpu_a, cpu_b }
}

fn orchestrator(local: BomTree, external: BomTree) -> SyncOrchestrator<StaticSnapshotProvider> {
    let config = EngineConfig::default();
    SyncOrchestrator::new(BomSession::new(local, &config), StaticSnapshotProvider::new(external), &config)
}

fn no_progress() -> impl FnMut(&SyncProgress) + Send {
    |_: &SyncProgress| {}
}

// ===== Substitution and rollup =====

#[test]
fn test_applying_cheaper_alternate_drops_total_cost() {
    let Fixture { tree, cpu_a, cpu_b, .. } = server_bom();
    let mut session = BomSession::new(tree, &EngineConfig::default());
    assert_eq!(session.views().rollup.total_cost, 2599.0);

    session.apply_alternate(AlternateChoice::Existing(cpu_b)).unwrap();
    let views = session.recompute();
    assert_eq!(views.rollup.total_cost, 1899.0);
    assert_eq!(views.rollup.active_alternative_parts, 1);
    assert!(views.report.is_valid);

    let tree = session.tree();
    assert_eq!(tree.node(cpu_a).unwrap().status(), Some(ItemStatus::Inactive));
    assert_eq!(tree.node(cpu_a).unwrap().attributes().unwrap().quantity, 0.0);
}

#[test]
fn test_flattened_parts_follow_tree_order() {
    let Fixture { tree, .. } = server_bom();
    let parts = tree.flatten_parts();
    let positions: Vec<&str> = parts.iter().map(|p| p.position.as_str()).collect();
    assert_eq!(positions, vec!["M1.U1.S1.F1.G1.P1", "M1.U1.S1.F1.G1.P1.A"]);
    assert_eq!(parts[1].level, 7);
    assert_eq!(parts[1].cost, 1899.0);
    assert_eq!(parts[1].quantity, 0.0);
}

// ===== Reconciliation =====

#[tokio::test]
async fn test_alternate_missing_in_erp_is_one_high_add() {
    let Fixture { tree: local, cpu_b, .. } = server_bom();
    let mut external = local.clone();
    external.remove(cpu_b).unwrap();

    let mut sync = orchestrator(local, external);
    assert_eq!(sync.refresh().await.unwrap(), 1);

    let diffs = sync.active_diffs();
    assert_eq!(diffs[0].diff_type, DiffType::Add);
    assert_eq!(diffs[0].position, "M1.U1.S1.F1.G1.P1.A");
    assert_eq!(diffs[0].severity, Severity::High);
}

#[tokio::test]
async fn test_fix_one_is_idempotent() {
    let Fixture { tree: local, cpu_a, .. } = server_bom();
    let mut external = local.clone();
    external.update_cost(cpu_a, 2399.0, 1.0).unwrap();

    let mut sync = orchestrator(local, external);
    sync.refresh().await.unwrap();
    let cost = sync.active_diffs()[0].clone();
    assert_eq!(cost.diff_type, DiffType::CostChange);
    assert_eq!(cost.delta_cost, 200.0);

    sync.fix_one(cost.id).unwrap();
    let after_first = sync.session().tree().clone();
    sync.fix_one(cost.id).unwrap();
    assert_eq!(sync.session().tree(), &after_first);
    assert_eq!(sync.session_mut().recompute().rollup.total_cost, 2399.0);

    assert_eq!(sync.refresh().await.unwrap(), 0);
}

#[tokio::test]
async fn test_local_alternate_unknown_to_erp_is_rolled_back() {
    let Fixture { tree: base, cpu_a, cpu_b, .. } = server_bom();
    let mut external = base.clone();
    external.remove(cpu_b).unwrap();
    let mut local = base;
    local.apply_alternate(AlternateChoice::Existing(cpu_b)).unwrap();

    let mut sync = orchestrator(local, external);
    sync.refresh().await.unwrap();
    let kinds: Vec<DiffType> = sync.active_diffs().iter().map(|d| d.diff_type).collect();
    assert_eq!(kinds, vec![DiffType::LifecycleChange, DiffType::CostChange, DiffType::Add]);

    let ids: Vec<_> = sync.active_diffs().iter().map(|d| d.id).collect();
    let result = sync.fix_many(&ids, &mut no_progress());
    assert_eq!((result.fixed, result.failed), (3, 0));

    assert_eq!(sync.refresh().await.unwrap(), 0);
    let session = sync.session_mut();
    assert_eq!(session.tree().node(cpu_a).unwrap().status(), Some(ItemStatus::Active));
    assert_eq!(session.recompute().rollup.total_cost, 2599.0);
    assert_eq!(session.views().rollup.active_parts, 1);
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let Fixture { tree: local, group, .. } = server_bom();
    let mut external = local.clone();
    let family = external.parent(group).unwrap();
    let cooling = external.add_container(family, "Cooling").unwrap();
    external.add_part(cooling, PartAttributes::new("FAN-80", "80mm fan", 12.0)).unwrap();

    let mut sync = orchestrator(local, external);
    sync.refresh().await.unwrap();
    let diffs = sync.active_diffs();
    assert_eq!(diffs.len(), 2);
    // Restoring the part before its group cannot find a parent.
    let reversed: Vec<_> = diffs.iter().rev().map(|d| d.id).collect();

    let mut seen = Vec::new();
    let result = sync.fix_many(&reversed, &mut |p: &SyncProgress| seen.push((p.current, p.percent, p.succeeded)));
    assert_eq!(result.fixed, 1);
    assert_eq!(result.failed, 1);
    assert!(!result.cancelled);
    assert_eq!(seen, vec![(1, 50.0, false), (2, 100.0, true)]);
    assert!(matches!(sync.failure(reversed[0]), Some(BomError::MissingParent { .. })));
    assert_eq!(sync.state(), SyncState::Error);

    // Retrying now that the group exists succeeds.
    sync.fix_one(reversed[0]).unwrap();
    assert!(sync.failure(reversed[0]).is_none());
    assert_eq!(sync.refresh().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancellation_keeps_applied_fixes() {
    let Fixture { tree: local, group, .. } = server_bom();
    let mut external = local.clone();
    let family = external.parent(group).unwrap();
    for label in ["Cooling", "Storage", "Memory"] {
        external.add_container(family, label).unwrap();
    }

    let mut sync = orchestrator(local, external);
    sync.refresh().await.unwrap();
    let ids: Vec<_> = sync.active_diffs().iter().map(|d| d.id).collect();
    assert_eq!(ids.len(), 3);

    let token = sync.cancel_token();
    let result = sync.fix_many(&ids, &mut |p: &SyncProgress| {
        if p.current == 1 {
            token.cancel();
        }
    });
    assert!(result.cancelled);
    assert_eq!(result.fixed, 1);
    assert_eq!(result.processed(), 1);
    assert_eq!(sync.active_diffs().len(), 2);
    assert!(sync.session().tree().find_by_position("M1.U1.S1.F1.G2").is_some());

    // The next batch starts with a fresh token.
    let remaining: Vec<_> = sync.active_diffs().iter().map(|d| d.id).collect();
    let result = sync.fix_many(&remaining, &mut no_progress());
    assert_eq!(result.fixed, 2);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn test_one_click_sync_fixes_high_diffs_and_refreshes() {
    let Fixture { tree: local, cpu_a, cpu_b, .. } = server_bom();
    let mut external = local.clone();
    external.remove(cpu_b).unwrap();
    external.update_cost(cpu_a, 2589.0, 1.0).unwrap();

    let mut sync = orchestrator(local, external);
    sync.refresh().await.unwrap();
    assert_eq!(sync.active_diffs().len(), 2);

    let report = sync.one_click_sync(&mut no_progress()).await;
    assert_eq!(report.batch.fixed, 1);
    assert_eq!(report.refreshed_diffs, Some(1));
    assert!(report.refresh_error.is_none());

    let remaining = sync.active_diffs();
    assert_eq!(remaining[0].diff_type, DiffType::CostChange);
    assert_eq!(remaining[0].severity, Severity::Low);
    assert_eq!(sync.state(), SyncState::Success);

    let events = sync.session_mut().drain_events();
    assert!(events.iter().any(|e| matches!(e, BomEvent::DiffFixed { .. })));
    assert!(events.iter().any(|e| matches!(e, BomEvent::NodeRemoved { count: 1, .. })));
}

#[tokio::test]
async fn test_unavailable_snapshot_enters_error_state() {
    let Fixture { tree: local, .. } = server_bom();
    let mut sync = orchestrator(local.clone(), local);
    sync.refresh().await.unwrap();

    sync.provider().set_snapshot(None);
    let report = sync.one_click_sync(&mut no_progress()).await;
    assert_eq!(report.batch.processed(), 0);
    assert!(matches!(report.refresh_error, Some(BomError::ExternalSnapshotUnavailable { .. })));
    assert_eq!(sync.state(), SyncState::Error);
}

#[tokio::test]
async fn test_ignored_diffs_leave_tree_untouched() {
    let Fixture { tree: local, cpu_b, group, .. } = server_bom();
    let mut external = local.clone();
    external.remove(cpu_b).unwrap();

    let mut sync = orchestrator(local.clone(), external);
    sync.refresh().await.unwrap();
    let id = sync.active_diffs()[0].id;
    sync.ignore(id).unwrap();

    assert!(sync.active_diffs().is_empty());
    assert!(sync.suggestions().is_empty());
    assert_eq!(sync.session().tree(), &local);
    assert_eq!(sync.session().tree().children(group).len(), 1);
}
