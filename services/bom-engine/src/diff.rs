//! Diff & Reconciliation Engine
//!
//! Compares the local tree against an external ERP snapshot keyed by
//! position and classifies every discrepancy.

use std::collections::BTreeSet;

use bomsync_models::{BomNode, DiffRecord, DiffType, PartAttributes, Severity};
use bomsync_utils::{normalize_certifications, EngineConfig};

use crate::tree::BomTree;

/// Cost differences at or below this are treated as equal.
pub const COST_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct DiffEngine {
    material_cost_threshold: f64,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DiffEngine {
    pub fn new(material_cost_threshold: f64) -> Self {
        Self { material_cost_threshold }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.material_cost_threshold)
    }

    pub fn material_cost_threshold(&self) -> f64 {
        self.material_cost_threshold
    }

    pub fn severity_for(&self, diff_type: DiffType, delta_cost: f64) -> Severity {
        match diff_type {
            DiffType::Add | DiffType::Delete | DiffType::ComplianceGap => Severity::High,
            _ if delta_cost.abs() > self.material_cost_threshold => Severity::High,
            DiffType::LifecycleChange => Severity::Medium,
            DiffType::CostChange => Severity::Low,
        }
    }

    /// Produces the diff set. Order: records for positions present on both
    /// sides (local pre-order), then `Add` records (local post-order), then
    /// `Delete` records (external pre-order).
    pub fn diff(&self, local: &BomTree, external: &BomTree) -> Vec<DiffRecord> {
        let local_index = local.position_index();
        let external_index = external.position_index();
        let mut records = Vec::new();

        for id in local.preorder() {
            let Some(node) = local.get(id) else { continue };
            if local_index.get(node.position.as_str()) != Some(&id) {
                continue;
            }
            let Some(remote) = external_index.get(node.position.as_str()).and_then(|r| external.get(*r)) else {
                continue;
            };
            if let (Some(mine), Some(theirs)) = (node.attributes(), remote.attributes()) {
                self.compare_parts(node, mine, theirs, &mut records);
            }
        }

        for id in local.postorder() {
            let Some(node) = local.get(id) else { continue };
            if local_index.get(node.position.as_str()) != Some(&id) || external_index.contains_key(node.position.as_str()) {
                continue;
            }
            let delta = node.attributes().map(PartAttributes::line_cost).unwrap_or(0.0);
            records.push(
                DiffRecord::new(&node.position, node.display_name(), DiffType::Add, self.severity_for(DiffType::Add, delta))
                    .with_values(Some(describe(node)), None)
                    .with_delta_cost(delta),
            );
        }

        for id in external.preorder() {
            let Some(node) = external.get(id) else { continue };
            if external_index.get(node.position.as_str()) != Some(&id) || local_index.contains_key(node.position.as_str()) {
                continue;
            }
            let delta = -node.attributes().map(PartAttributes::line_cost).unwrap_or(0.0);
            records.push(
                DiffRecord::new(&node.position, node.display_name(), DiffType::Delete, self.severity_for(DiffType::Delete, delta))
                    .with_values(None, Some(describe(node)))
                    .with_delta_cost(delta),
            );
        }

        tracing::debug!(
            local_nodes = local.len(),
            external_nodes = external.len(),
            diffs = records.len(),
            "Diff computed"
        );
        records
    }

    fn compare_parts(&self, node: &BomNode, mine: &PartAttributes, theirs: &PartAttributes, records: &mut Vec<DiffRecord>) {
        if mine.lifecycle != theirs.lifecycle {
            records.push(
                DiffRecord::new(
                    &node.position,
                    &mine.name,
                    DiffType::LifecycleChange,
                    self.severity_for(DiffType::LifecycleChange, 0.0),
                )
                .with_values(Some(mine.lifecycle.to_string()), Some(theirs.lifecycle.to_string())),
            );
        }

        // A part that is effective on one side only always changes the rollup,
        // even when both line costs happen to agree.
        let delta = mine.line_cost() - theirs.line_cost();
        if delta.abs() > COST_TOLERANCE || mine.status.is_active() != theirs.status.is_active() {
            records.push(
                DiffRecord::new(&node.position, &mine.name, DiffType::CostChange, self.severity_for(DiffType::CostChange, delta))
                    .with_values(Some(cost_summary(mine)), Some(cost_summary(theirs)))
                    .with_delta_cost(delta),
            );
        }

        if let Some(note) = compliance_note(&mine.certifications, &theirs.certifications) {
            records.push(
                DiffRecord::new(
                    &node.position,
                    &mine.name,
                    DiffType::ComplianceGap,
                    self.severity_for(DiffType::ComplianceGap, 0.0),
                )
                .with_values(Some(mine.certifications.join(", ")), Some(theirs.certifications.join(", ")))
                .with_compliance_note(note),
            );
        }
    }
}

fn describe(node: &BomNode) -> String {
    match node.attributes() {
        Some(a) => format!("{} {} ({}, {}) {} x {:.2}", a.part_number, a.name, a.status, a.lifecycle, a.quantity, a.unit_cost),
        None => format!("{} {}", node.level(), node.display_name()),
    }
}

fn cost_summary(attributes: &PartAttributes) -> String {
    format!(
        "{}: {} x {:.2} = {:.2}",
        attributes.status,
        attributes.quantity,
        attributes.unit_cost,
        attributes.line_cost()
    )
}

/// Note listing certifications present on one side only, or `None` when the
/// normalized sets agree.
pub fn compliance_note(local: &[String], external: &[String]) -> Option<String> {
    let local: BTreeSet<String> = normalize_certifications(local).into_iter().collect();
    let external: BTreeSet<String> = normalize_certifications(external).into_iter().collect();

    let missing_externally: Vec<&str> = local.difference(&external).map(String::as_str).collect();
    let missing_locally: Vec<&str> = external.difference(&local).map(String::as_str).collect();

    let mut parts = Vec::new();
    if !missing_externally.is_empty() {
        parts.push(format!("missing in ERP: {}", missing_externally.join(", ")));
    }
    if !missing_locally.is_empty() {
        parts.push(format!("missing locally: {}", missing_locally.join(", ")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bomsync_models::{ItemStatus, Lifecycle, NodeId};
    use pretty_assertions::assert_eq;

    fn base_tree() -> (BomTree, NodeId, NodeId) {
        let mut tree = BomTree::with_root("Server");
        let mut parent = tree.root().unwrap();
        for label in ["Compute", "Board", "Processors", "CPU socket"] {
            parent = tree.add_container(parent, label).unwrap();
        }
        let primary = tree
            .add_part(parent, PartAttributes::new("CPU-A", "CPU A", 2599.0).with_certification("RoHS"))
            .unwrap();
        (tree, parent, primary)
    }

    fn kinds(records: &[DiffRecord]) -> Vec<(DiffType, String)> {
        records.iter().map(|r| (r.diff_type, r.position.clone())).collect()
    }

    #[test]
    fn test_identical_trees_have_no_diffs() {
        let (tree, _, _) = base_tree();
        assert!(DiffEngine::default().diff(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn test_add_and_delete_ordering() {
        let (mut local, group, primary) = base_tree();
        let external = local.clone();
        local
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();
        let mut external = external;
        let other = external.add_container(external.root().unwrap(), "Power").unwrap();
        let other_family = external.add_container(other, "PSU").unwrap();
        local.remove(primary).unwrap();
        local.remove(group).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        assert_eq!(
            kinds(&records),
            vec![
                (DiffType::Delete, "M1.U1.S1.F1.G1".to_string()),
                (DiffType::Delete, "M1.U1.S1.F1.G1.P1".to_string()),
                (DiffType::Delete, "M1.U2".to_string()),
                (DiffType::Delete, "M1.U2.S1".to_string()),
            ]
        );
        assert!(records.iter().all(|r| r.severity == Severity::High));
        assert_eq!(records[1].delta_cost, -2599.0);
        assert!(external.get(other_family).is_some());
    }

    #[test]
    fn test_adds_are_children_first() {
        let (mut local, group, _) = base_tree();
        let external = local.clone();
        let family = local.parent(group).unwrap();
        let new_group = local.add_container(family, "Cooling").unwrap();
        local.add_part(new_group, PartAttributes::new("FAN", "Fan", 15.0)).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        assert_eq!(
            kinds(&records),
            vec![
                (DiffType::Add, "M1.U1.S1.F1.G2.P1".to_string()),
                (DiffType::Add, "M1.U1.S1.F1.G2".to_string()),
            ]
        );
        assert_eq!(records[0].delta_cost, 15.0);
    }

    #[test]
    fn test_matched_position_classification() {
        let (local, _, primary) = base_tree();
        let mut external = local.clone();
        external.set_lifecycle(primary, Lifecycle::PhaseOut).unwrap();
        external.update_cost(primary, 2000.0, 1.0).unwrap();
        external.set_certifications(primary, vec!["REACH".into()]).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        let types: Vec<DiffType> = records.iter().map(|r| r.diff_type).collect();
        assert_eq!(types, vec![DiffType::LifecycleChange, DiffType::CostChange, DiffType::ComplianceGap]);

        assert_eq!(records[0].severity, Severity::Medium);
        assert_eq!(records[0].external_value.as_deref(), Some("phase_out"));
        assert_eq!(records[1].delta_cost, 599.0);
        assert_eq!(records[1].severity, Severity::High);
        assert_eq!(records[2].severity, Severity::High);
        assert_eq!(
            records[2].compliance_note.as_deref(),
            Some("missing in ERP: ROHS; missing locally: REACH")
        );
    }

    #[test]
    fn test_small_cost_drift_is_low() {
        let (local, _, primary) = base_tree();
        let mut external = local.clone();
        external.update_cost(primary, 2589.0, 1.0).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Low);
        assert_eq!(records[0].delta_cost, 10.0);
    }

    #[test]
    fn test_effective_part_swap_is_a_cost_change() {
        let (mut local, _, primary) = base_tree();
        let alternate = local
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 0.0).with_status(ItemStatus::Inactive))
            .unwrap();
        local.update_cost(primary, 0.0, 1.0).unwrap();
        let external = local.clone();
        local.apply_alternate(crate::AlternateChoice::Existing(alternate)).unwrap();

        let records = DiffEngine::default().diff(&local, &external);
        let costs: Vec<&DiffRecord> = records.iter().filter(|r| r.diff_type == DiffType::CostChange).collect();
        assert_eq!(costs.len(), 2);
        assert!(costs.iter().all(|r| r.delta_cost == 0.0 && r.severity == Severity::Low));
        assert_eq!(costs[0].external_value.as_deref(), Some("active: 1 x 0.00 = 0.00"));
    }

    #[test]
    fn test_certification_spelling_is_not_a_gap() {
        assert_eq!(compliance_note(&["rohs".into()], &["RoHS ".into()]), None);
    }
}
