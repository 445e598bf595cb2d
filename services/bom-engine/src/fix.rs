//! Applies a single diff record to the local tree, taking the ERP snapshot
//! as the source of truth.

use bomsync_models::{BomError, BomNode, BomResult, DiffRecord, DiffType, ItemStatus, Level, Lifecycle, NodeId, PartAttributes};
use serde::{Deserialize, Serialize};

use crate::substitution::{AlternateChoice, MemberState, Transition};
use crate::tree::BomTree;

/// What a fix did to the local tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FixEffect {
    Removed(Vec<BomNode>),
    Restored {
        node: NodeId,
        transition: Option<Transition>,
    },
    Updated(Transition),
    /// The tree already matched the snapshot at this position.
    AlreadyConsistent,
}

fn local_node(local: &BomTree, position: &str) -> BomResult<NodeId> {
    local
        .find_by_position(position)
        .ok_or_else(|| BomError::node_not_found(position))
}

fn external_part<'a>(external: &'a BomTree, position: &str) -> BomResult<&'a BomNode> {
    external
        .find_by_position(position)
        .and_then(|id| external.get(id))
        .filter(|n| n.is_part())
        .ok_or_else(|| BomError::node_not_found(format!("ERP part {}", position)))
}

/// Brings `local` in line with `external` for one record.
pub fn apply_fix(local: &mut BomTree, external: &BomTree, record: &DiffRecord) -> BomResult<FixEffect> {
    let position = record.position.as_str();
    match record.diff_type {
        DiffType::Add => match local.find_by_position(position) {
            Some(id) => Ok(FixEffect::Removed(local.remove(id)?)),
            None => Ok(FixEffect::AlreadyConsistent),
        },
        DiffType::Delete => restore(local, external, position),
        DiffType::LifecycleChange => {
            let lifecycle = external_attributes(external, position)?.lifecycle;
            let id = local_node(local, position)?;
            Ok(FixEffect::Updated(local.set_lifecycle(id, lifecycle)?))
        }
        DiffType::CostChange => {
            let source = external_attributes(external, position)?;
            let id = local_node(local, position)?;
            Ok(FixEffect::Updated(adopt_cost(local, external, id, source)?))
        }
        DiffType::ComplianceGap => {
            let certifications = external_attributes(external, position)?.certifications.clone();
            let id = local_node(local, position)?;
            Ok(FixEffect::Updated(local.set_certifications(id, certifications)?))
        }
    }
}

fn external_attributes<'a>(external: &'a BomTree, position: &str) -> BomResult<&'a PartAttributes> {
    external_part(external, position)?
        .attributes()
        .ok_or_else(|| BomError::node_not_found(position))
}

/// Takes cost and quantity from the ERP line. When the part is effective on
/// one side only, the whole group first adopts the ERP's effective part.
fn adopt_cost(local: &mut BomTree, external: &BomTree, id: NodeId, source: &PartAttributes) -> BomResult<Transition> {
    let quantity = if source.status.is_active() {
        source.quantity
    } else {
        source.restore_quantity.unwrap_or(source.quantity)
    };
    if local.node(id)?.is_active_part() == source.status.is_active() {
        return local.update_cost(id, source.unit_cost, quantity);
    }

    // Both steps land together or not at all.
    let mut staged = local.clone();
    let reconciled = reconcile_group(&mut staged, external, id)?;
    let mut transition = staged.update_cost(id, source.unit_cost, quantity)?;
    transition.effective = reconciled.effective;
    transition.changes = reconciled.changes;
    *local = staged;
    Ok(transition)
}

/// Aligns status and lifecycle of every member of the group holding `id` with
/// the ERP snapshot. Local-only members that are Active are retired.
fn reconcile_group(local: &mut BomTree, external: &BomTree, id: NodeId) -> BomResult<Transition> {
    let node = local.node(id)?;
    let primary = match node.level() {
        Level::Primary => id,
        _ => local
            .governing_primary(id)
            .ok_or_else(|| BomError::group_violation(&node.position, "alternate has no governing primary"))?,
    };

    let mut targets = Vec::new();
    for member in local.group_of(primary)?.members() {
        let node = local.node(member)?;
        let source = external
            .find_by_position(&node.position)
            .and_then(|e| external.get(e))
            .and_then(BomNode::attributes);
        match source {
            Some(source) => targets.push(MemberState {
                node: member,
                status: source.status,
                lifecycle: source.lifecycle,
                quantity: source.quantity,
            }),
            None if node.is_active_part() => targets.push(MemberState {
                node: member,
                status: ItemStatus::Inactive,
                lifecycle: Lifecycle::PhaseOut,
                quantity: 0.0,
            }),
            None => {}
        }
    }
    let transition = local.reconcile_group(primary, &targets)?;
    tracing::debug!(primary = %primary, effective = ?transition.effective, "Group reconciled with ERP snapshot");
    Ok(transition)
}

fn restore(local: &mut BomTree, external: &BomTree, position: &str) -> BomResult<FixEffect> {
    if local.find_by_position(position).is_some() {
        return Ok(FixEffect::AlreadyConsistent);
    }
    let source = external
        .find_by_position(position)
        .and_then(|id| external.get(id))
        .ok_or_else(|| BomError::node_not_found(format!("ERP node {}", position)))?;

    let parent_position = source
        .parent
        .and_then(|p| external.get(p))
        .map(|p| p.position.clone())
        .ok_or_else(|| BomError::missing_parent(format!("{} has no parent in the ERP snapshot", position)))?;
    let parent = local
        .find_by_position(&parent_position)
        .ok_or_else(|| BomError::missing_parent(format!("{} is not in the local tree", parent_position)))?;

    let node = local.insert_at(parent, position, source.kind.clone())?;
    let mut transition = None;
    if source.is_active_part() {
        let activated = match source.level() {
            Level::Primary => local.enable(node),
            _ => local.apply_alternate(AlternateChoice::Existing(node)),
        };
        match activated {
            Ok(t) => transition = Some(t),
            Err(e) => {
                // Roll the insert back so a failed restore leaves no trace.
                local.remove(node)?;
                return Err(e);
            }
        }
        if let Some(lifecycle) = source.attributes().map(|a| a.lifecycle) {
            local.set_lifecycle(node, lifecycle)?;
        }
    }
    tracing::debug!(position, node = %node, "Node restored from ERP snapshot");
    Ok(FixEffect::Restored { node, transition })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEngine;

    fn snapshot() -> (BomTree, NodeId, NodeId) {
        let mut tree = BomTree::with_root("Server");
        let mut parent = tree.root().unwrap();
        for label in ["Compute", "Board", "Processors", "CPU socket"] {
            parent = tree.add_container(parent, label).unwrap();
        }
        let primary = tree
            .add_part(parent, PartAttributes::new("CPU-A", "CPU A", 2599.0).with_quantity(2.0))
            .unwrap();
        (tree, parent, primary)
    }

    fn converge(local: &mut BomTree, external: &BomTree) {
        for record in DiffEngine::default().diff(local, external) {
            apply_fix(local, external, &record).unwrap();
        }
    }

    #[test]
    fn test_add_removes_local_node() {
        let (external, _, primary) = snapshot();
        let mut local = external.clone();
        local
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();

        converge(&mut local, &external);
        assert_eq!(local.len(), external.len());
        assert!(local.find_by_position("M1.U1.S1.F1.G1.P1.A").is_none());
        assert!(DiffEngine::default().diff(&local, &external).is_empty());
    }

    #[test]
    fn test_delete_restores_active_alternate() {
        let (mut external, _, primary) = snapshot();
        let local = external.clone();
        let alternate = external
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();
        external.apply_alternate(AlternateChoice::Existing(alternate)).unwrap();

        let mut local = local;
        let records = DiffEngine::default().diff(&local, &external);
        for record in &records {
            apply_fix(&mut local, &external, record).unwrap();
        }

        let restored = local.find_by_position("M1.U1.S1.F1.G1.P1.A").unwrap();
        assert!(local.node(restored).unwrap().is_active_part());
        assert_eq!(local.node(primary).unwrap().status(), Some(ItemStatus::Inactive));
        assert!(DiffEngine::default().diff(&local, &external).is_empty());
    }

    #[test]
    fn test_delete_without_local_parent_fails() {
        let (external, group, _) = snapshot();
        let mut local = external.clone();
        let primary = local.children(group)[0];
        local.remove(primary).unwrap();
        local.remove(group).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        let part_record = records.iter().find(|r| r.position.ends_with(".P1")).unwrap();
        let before = local.clone();
        assert!(matches!(
            apply_fix(&mut local, &external, part_record),
            Err(BomError::MissingParent { .. })
        ));
        assert_eq!(local, before);
    }

    #[test]
    fn test_value_fixes_adopt_external() {
        let (mut external, _, primary) = snapshot();
        let mut local = external.clone();
        external.update_cost(primary, 2000.0, 3.0).unwrap();
        external.set_lifecycle(primary, Lifecycle::Obsolete).unwrap();
        external.set_certifications(primary, vec!["RoHS".into()]).unwrap();

        converge(&mut local, &external);
        let attributes = local.node(primary).unwrap().attributes().unwrap();
        assert_eq!(attributes.unit_cost, 2000.0);
        assert_eq!(attributes.quantity, 3.0);
        assert_eq!(attributes.lifecycle, Lifecycle::Obsolete);
        assert_eq!(attributes.certifications, vec!["RoHS".to_string()]);
    }

    #[test]
    fn test_local_alternate_swap_converges_to_erp() {
        let (external, _, primary) = snapshot();
        let mut local = external.clone();
        let alternate = local
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();
        local.apply_alternate(AlternateChoice::Existing(alternate)).unwrap();

        converge(&mut local, &external);
        assert!(DiffEngine::default().diff(&local, &external).is_empty());
        assert!(local.get(alternate).is_none());
        let attributes = local.node(primary).unwrap().attributes().unwrap();
        assert_eq!(attributes.status, ItemStatus::Active);
        assert_eq!(attributes.quantity, 2.0);
        assert_eq!(crate::rollup(&local).total_cost, 2599.0 * 2.0);
    }

    #[test]
    fn test_erp_alternate_swap_is_adopted_by_cost_fix() {
        let (mut external, _, primary) = snapshot();
        let alternate = external
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();
        let mut local = external.clone();
        external.apply_alternate(AlternateChoice::Existing(alternate)).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        let cost = records.iter().find(|r| r.diff_type == DiffType::CostChange).unwrap();
        assert_eq!(cost.position, "M1.U1.S1.F1.G1.P1");

        let effect = apply_fix(&mut local, &external, cost).unwrap();
        let FixEffect::Updated(transition) = effect else { panic!("expected an update") };
        assert_eq!(transition.effective, Some(alternate));
        assert_eq!(transition.changes.len(), 2);
        assert!(local.node(alternate).unwrap().is_active_part());

        converge(&mut local, &external);
        assert!(DiffEngine::default().diff(&local, &external).is_empty());
    }

    #[test]
    fn test_position_missing_from_snapshot_is_not_found() {
        let (external, _, primary) = snapshot();
        let mut local = external.clone();
        let mut stale = external.clone();
        stale.update_cost(primary, 10.0, 1.0).unwrap();
        let record = DiffEngine::default().diff(&local, &stale).remove(0);

        let mut empty = external;
        empty.remove(primary).unwrap();
        let result = apply_fix(&mut local, &empty, &record);
        assert!(matches!(result, Err(BomError::NodeNotFound { .. })));
        assert!(!result.unwrap_err().is_external());
    }

    #[test]
    fn test_fix_is_idempotent() {
        let (external, _, primary) = snapshot();
        let mut local = external.clone();
        local
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1.0).with_status(ItemStatus::Inactive))
            .unwrap();
        let record = DiffEngine::default().diff(&local, &external).remove(0);

        assert!(matches!(apply_fix(&mut local, &external, &record), Ok(FixEffect::Removed(_))));
        let after = local.clone();
        assert_eq!(apply_fix(&mut local, &external, &record), Ok(FixEffect::AlreadyConsistent));
        assert_eq!(local, after);
    }
}
