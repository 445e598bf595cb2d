//! BOM Validator
//!
//! Checks structural invariants and reports them as severity-tagged issues.
//! Never fails: problems are data, not errors.

use std::collections::HashMap;

use bomsync_models::{ItemStatus, Level, Lifecycle, NodeId, Severity};
use bomsync_utils::{is_well_formed_position, ValidationMode};
use serde::{Deserialize, Serialize};

use crate::tree::BomTree;

/// Single validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub position: String,
    pub message: String,
    pub severity: Severity,
    pub node: Option<NodeId>,
}

impl Issue {
    fn new(position: impl Into<String>, message: impl Into<String>, severity: Severity, node: Option<NodeId>) -> Self {
        Self {
            position: position.into(),
            message: message.into(),
            severity,
            node,
        }
    }
}

/// Validation summary for a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No High issue was found.
    pub is_valid: bool,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
        let high_count = count(Severity::High);
        Self {
            is_valid: high_count == 0,
            high_count,
            medium_count: count(Severity::Medium),
            low_count: count(Severity::Low),
            issues,
        }
    }
}

/// BOM validator
#[derive(Debug, Clone)]
pub struct BomValidator {
    mode: ValidationMode,
}

impl Default for BomValidator {
    fn default() -> Self {
        Self::new(ValidationMode::Publish)
    }
}

impl BomValidator {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate a tree snapshot
    pub fn validate(&self, tree: &BomTree) -> Vec<Issue> {
        let mut issues = Vec::new();
        let order = tree.preorder();

        // Duplicate part positions
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for node in order.iter().filter_map(|id| tree.get(*id)).filter(|n| n.is_part()) {
            let count = seen.entry(node.position.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                issues.push(Issue::new(
                    &node.position,
                    format!("Duplicate position {}", node.position),
                    Severity::High,
                    Some(node.id),
                ));
            }
        }

        for node in order.iter().filter_map(|id| tree.get(*id)) {
            if !is_well_formed_position(&node.position) {
                issues.push(Issue::new(
                    &node.position,
                    format!("Position {} does not follow the position grammar", node.position),
                    Severity::Low,
                    Some(node.id),
                ));
            }

            let Some(attributes) = node.attributes() else { continue };

            if attributes.status == ItemStatus::Active && attributes.quantity <= 0.0 {
                issues.push(Issue::new(
                    &node.position,
                    format!("Active part {} must have a positive quantity", attributes.name),
                    Severity::High,
                    Some(node.id),
                ));
            }

            if attributes.lifecycle == Lifecycle::PhaseOut {
                issues.push(Issue::new(
                    &node.position,
                    format!("Part {} is phasing out", attributes.name),
                    Severity::Medium,
                    Some(node.id),
                ));
            }

            if node.level() == Level::Alternate && tree.governing_primary(node.id).is_none() {
                issues.push(Issue::new(
                    &node.position,
                    format!("Alternate {} has no governing primary part", attributes.name),
                    Severity::High,
                    Some(node.id),
                ));
            }
        }

        for group in tree.groups() {
            let Some(primary) = tree.get(group.primary) else { continue };
            let active = tree.active_members(&group);
            if active.len() > 1 {
                issues.push(Issue::new(
                    &primary.position,
                    format!("Substitute group has {} active parts; exactly one is allowed", active.len()),
                    Severity::High,
                    Some(primary.id),
                ));
            } else if active.is_empty() {
                let message = if primary.status() == Some(ItemStatus::Deprecated) {
                    format!("Primary {} is deprecated and no alternate is active", primary.display_name())
                } else {
                    format!("Substitute group of {} has no active part", primary.display_name())
                };
                issues.push(Issue::new(&primary.position, message, Severity::Medium, Some(primary.id)));
            }
        }

        if self.mode == ValidationMode::Publish && !tree.part_nodes().any(|n| n.is_active_part()) {
            let position = tree
                .root()
                .and_then(|r| tree.get(r))
                .map(|n| n.position.clone())
                .unwrap_or_default();
            issues.push(Issue::new(
                position,
                "BOM not publishable: no active parts",
                Severity::High,
                tree.root(),
            ));
        }

        issues
    }

    pub fn report(&self, tree: &BomTree) -> ValidationReport {
        ValidationReport::from_issues(self.validate(tree))
    }
}

/// Validates with the given mode.
pub fn validate(tree: &BomTree, mode: ValidationMode) -> Vec<Issue> {
    BomValidator::new(mode).validate(tree)
}
