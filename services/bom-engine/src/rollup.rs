//! Cost Rollup & Statistics Engine
//!
//! Pure aggregation over a tree snapshot. Each substitute group contributes
//! at most one effective part: an Active alternate takes precedence over the
//! primary, and non-active parts never contribute.

use std::collections::BTreeSet;

use bomsync_models::{ItemStatus, Level, NodeId};
use serde::{Deserialize, Serialize};

use crate::tree::BomTree;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupStats {
    pub total_cost: f64,
    pub total_parts: usize,
    pub active_parts: usize,
    pub deprecated_parts: usize,
    /// Inactive and Replaced parts.
    pub inactive_parts: usize,
    pub alternative_parts: usize,
    pub active_alternative_parts: usize,
    pub supplier_count: usize,
    pub average_variance: f64,
}

/// What one substitute group adds to the rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupContribution {
    pub primary: NodeId,
    /// Node whose cost is counted, `None` when the group has no effective part.
    pub effective: Option<NodeId>,
    pub cost: f64,
    pub supplier: Option<String>,
    pub variance: Option<f64>,
}

/// Per-group breakdown in pre-order of the primaries.
pub fn group_contributions(tree: &BomTree) -> Vec<GroupContribution> {
    tree.groups()
        .into_iter()
        .map(|group| {
            let active_alternate = group
                .alternates
                .iter()
                .copied()
                .find(|id| tree.get(*id).is_some_and(|n| n.is_active_part()));
            let effective = active_alternate.or_else(|| {
                tree.get(group.primary)
                    .filter(|n| n.is_active_part())
                    .map(|n| n.id)
            });

            let attributes = effective.and_then(|id| tree.get(id)).and_then(|n| n.attributes());
            GroupContribution {
                primary: group.primary,
                effective,
                cost: attributes.map(|a| a.line_cost()).unwrap_or(0.0),
                supplier: attributes
                    .map(|a| a.supplier.trim().to_string())
                    .filter(|s| !s.is_empty()),
                variance: attributes.map(|a| a.variance_percent),
            }
        })
        .collect()
}

/// Rolls up cost and part statistics for the whole tree.
pub fn rollup(tree: &BomTree) -> RollupStats {
    let mut stats = RollupStats::default();

    for node in tree.part_nodes() {
        let Some(status) = node.status() else { continue };
        stats.total_parts += 1;
        match status {
            ItemStatus::Active => stats.active_parts += 1,
            ItemStatus::Deprecated => stats.deprecated_parts += 1,
            ItemStatus::Inactive | ItemStatus::Replaced => stats.inactive_parts += 1,
        }
        if node.level() == Level::Alternate {
            stats.alternative_parts += 1;
            if status.is_active() {
                stats.active_alternative_parts += 1;
            }
        }
    }

    let mut suppliers = BTreeSet::new();
    let mut variances = Vec::new();
    for contribution in group_contributions(tree) {
        if contribution.effective.is_none() {
            continue;
        }
        stats.total_cost += contribution.cost;
        if let Some(supplier) = contribution.supplier {
            suppliers.insert(supplier);
        }
        if let Some(variance) = contribution.variance {
            variances.push(variance);
        }
    }

    stats.supplier_count = suppliers.len();
    if !variances.is_empty() {
        stats.average_variance = variances.iter().sum::<f64>() / variances.len() as f64;
    }
    stats
}
