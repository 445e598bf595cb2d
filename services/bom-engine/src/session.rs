//! Editing session over one BOM document.
//!
//! Every mutation goes through a named operation that marks the session
//! dirty and queues events. Derived views (rollup, validation, flat parts)
//! are only rebuilt when [`BomSession::recompute`] is called on a dirty
//! session, so bursts of edits cost one recomputation.

use bomsync_models::{BomNode, BomResult, DiffRecord, FlatPart, Lifecycle, NodeId, PartAttributes};
use bomsync_utils::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::events::BomEvent;
use crate::fix::{apply_fix, FixEffect};
use crate::provider::CatalogProvider;
use crate::rollup::{rollup, RollupStats};
use crate::substitution::{AlternateChoice, Transition, TransitionKind};
use crate::tree::BomTree;
use crate::validator::{BomValidator, ValidationReport};

/// Derived views of the latest recomputed tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Views {
    pub rollup: RollupStats,
    pub report: ValidationReport,
    pub parts: Vec<FlatPart>,
}

impl Views {
    fn compute(tree: &BomTree, validator: &BomValidator) -> Self {
        Self {
            rollup: rollup(tree),
            report: validator.report(tree),
            parts: tree.flatten_parts(),
        }
    }
}

pub struct BomSession {
    tree: BomTree,
    validator: BomValidator,
    dirty: bool,
    views: Views,
    events: Vec<BomEvent>,
}

impl BomSession {
    pub fn new(tree: BomTree, config: &EngineConfig) -> Self {
        let validator = BomValidator::new(config.validation_mode);
        let views = Views::compute(&tree, &validator);
        Self {
            tree,
            validator,
            dirty: false,
            views,
            events: Vec::new(),
        }
    }

    /// Opens a session on the catalog's template for `product_key`.
    pub fn from_catalog(catalog: &dyn CatalogProvider, product_key: &str, config: &EngineConfig) -> BomResult<Self> {
        let tree = catalog.template(product_key)?;
        tracing::info!(product_key, nodes = tree.len(), "Session opened from template");
        Ok(Self::new(tree, config))
    }

    pub fn tree(&self) -> &BomTree {
        &self.tree
    }

    pub fn into_tree(self) -> BomTree {
        self.tree
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn add_container(&mut self, parent: NodeId, label: impl Into<String>) -> BomResult<NodeId> {
        let id = self.tree.add_container(parent, label)?;
        self.node_added(id);
        Ok(id)
    }

    pub fn add_part(&mut self, parent: NodeId, attributes: PartAttributes) -> BomResult<NodeId> {
        let id = self.tree.add_part(parent, attributes)?;
        self.node_added(id);
        Ok(id)
    }

    pub fn remove(&mut self, id: NodeId) -> BomResult<Vec<BomNode>> {
        let position = self.tree.node(id)?.position.clone();
        let (removed, handoff) = self.tree.remove_with_handoff(id)?;
        self.dirty = true;
        self.events.push(BomEvent::NodeRemoved { position, count: removed.len() });
        if let Some(transition) = handoff {
            self.transitioned(transition);
        }
        Ok(removed)
    }

    pub fn deprecate(&mut self, primary: NodeId) -> BomResult<Transition> {
        let transition = self.tree.deprecate(primary)?;
        Ok(self.transitioned(transition))
    }

    pub fn enable(&mut self, primary: NodeId) -> BomResult<Transition> {
        let transition = self.tree.enable(primary)?;
        Ok(self.transitioned(transition))
    }

    pub fn apply_alternate(&mut self, choice: AlternateChoice) -> BomResult<Transition> {
        let transition = self.tree.apply_alternate(choice)?;
        if let Some(inserted) = transition.inserted {
            self.node_added(inserted);
        }
        Ok(self.transitioned(transition))
    }

    pub fn toggle_status(&mut self, id: NodeId) -> BomResult<Transition> {
        let transition = self.tree.toggle_status(id)?;
        Ok(self.transitioned(transition))
    }

    pub fn update_cost(&mut self, id: NodeId, unit_cost: f64, quantity: f64) -> BomResult<Transition> {
        let transition = self.tree.update_cost(id, unit_cost, quantity)?;
        Ok(self.transitioned(transition))
    }

    pub fn set_lifecycle(&mut self, id: NodeId, lifecycle: Lifecycle) -> BomResult<Transition> {
        let transition = self.tree.set_lifecycle(id, lifecycle)?;
        Ok(self.transitioned(transition))
    }

    pub fn set_certifications(&mut self, id: NodeId, certifications: Vec<String>) -> BomResult<Transition> {
        let transition = self.tree.set_certifications(id, certifications)?;
        Ok(self.transitioned(transition))
    }

    /// Catalog alternates for a primary that are not yet in its group.
    pub fn candidate_alternates(&self, catalog: &dyn CatalogProvider, primary: NodeId) -> BomResult<Vec<PartAttributes>> {
        let group = self.tree.group_of(primary)?;
        let part_number = self
            .tree
            .node(primary)?
            .attributes()
            .map(|a| a.part_number.clone())
            .unwrap_or_default();
        let existing: Vec<&str> = group
            .alternates
            .iter()
            .filter_map(|id| self.tree.get(*id))
            .filter_map(|n| n.attributes())
            .map(|a| a.part_number.as_str())
            .collect();
        Ok(catalog
            .alternates_for(&part_number)
            .into_iter()
            .filter(|candidate| !existing.contains(&candidate.part_number.as_str()))
            .collect())
    }

    /// Applies one reconciliation fix from an ERP snapshot.
    pub fn apply_fix(&mut self, external: &BomTree, record: &DiffRecord) -> BomResult<FixEffect> {
        let effect = apply_fix(&mut self.tree, external, record)?;
        match &effect {
            FixEffect::Removed(nodes) => {
                self.dirty = true;
                self.events.push(BomEvent::NodeRemoved { position: record.position.clone(), count: nodes.len() });
            }
            FixEffect::Restored { node, transition } => {
                self.node_added(*node);
                if let Some(transition) = transition.clone() {
                    self.transitioned(transition);
                }
            }
            FixEffect::Updated(transition) => {
                self.transitioned(transition.clone());
            }
            FixEffect::AlreadyConsistent => {}
        }
        Ok(effect)
    }

    /// Rebuilds the views when the tree changed since the last call.
    pub fn recompute(&mut self) -> &Views {
        if self.dirty {
            self.views = Views::compute(&self.tree, &self.validator);
            self.dirty = false;
            tracing::debug!(
                total_cost = self.views.rollup.total_cost,
                issues = self.views.report.issues.len(),
                "Views recomputed"
            );
            self.events.push(BomEvent::ViewsRecomputed {
                total_cost: self.views.rollup.total_cost,
                high_issues: self.views.report.high_count,
            });
        }
        &self.views
    }

    /// Views as of the last recompute; stale while the session is dirty.
    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn drain_events(&mut self) -> Vec<BomEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: BomEvent) {
        self.events.push(event);
    }

    fn node_added(&mut self, id: NodeId) {
        self.dirty = true;
        if let Some(node) = self.tree.get(id) {
            self.events.push(BomEvent::NodeAdded { node: id, position: node.position.clone() });
        }
    }

    fn transitioned(&mut self, transition: Transition) -> Transition {
        self.dirty = true;
        for change in &transition.changes {
            self.events.push(BomEvent::StatusChanged { node: change.node, from: change.from, to: change.to });
        }
        if transition.kind == TransitionKind::ApplyAlternate {
            if let Some(alternate) = transition.effective {
                self.events.push(BomEvent::AlternateApplied { primary: transition.primary, alternate });
            }
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticCatalog;
    use bomsync_models::ItemStatus;
    use bomsync_utils::ValidationMode;

    fn session() -> (BomSession, NodeId) {
        let mut tree = BomTree::with_root("Server");
        let mut parent = tree.root().unwrap();
        for label in ["Compute", "Board", "Processors", "CPU socket"] {
            parent = tree.add_container(parent, label).unwrap();
        }
        (BomSession::new(tree, &EngineConfig::default()), parent)
    }

    #[test]
    fn test_views_recompute_only_when_dirty() {
        let (mut session, group) = session();
        assert!(!session.is_dirty());
        assert_eq!(session.views().report.high_count, 1);

        let primary = session
            .add_part(group, PartAttributes::new("CPU-A", "CPU A", 2599.0))
            .unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.views().rollup.total_cost, 0.0);

        assert_eq!(session.recompute().rollup.total_cost, 2599.0);
        assert!(!session.is_dirty());
        assert!(session.views().report.is_valid);

        let events = session.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], BomEvent::NodeAdded { node, .. } if *node == primary));
        assert!(matches!(events[1], BomEvent::ViewsRecomputed { high_issues: 0, .. }));

        session.recompute();
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn test_apply_alternate_from_catalog_emits_events() {
        let (mut session, group) = session();
        let primary = session
            .add_part(group, PartAttributes::new("CPU-A", "CPU A", 2599.0))
            .unwrap();
        let catalog = StaticCatalog::new().with_alternate("CPU-A", PartAttributes::new("CPU-B", "CPU B", 1899.0));
        session.drain_events();

        let candidates = session.candidate_alternates(&catalog, primary).unwrap();
        assert_eq!(candidates.len(), 1);
        let attributes = candidates.into_iter().next().unwrap();
        let transition = session
            .apply_alternate(AlternateChoice::Catalog { primary, attributes })
            .unwrap();
        let alternate = transition.inserted.unwrap();

        let events = session.drain_events();
        assert!(events.contains(&BomEvent::NodeAdded { node: alternate, position: "M1.U1.S1.F1.G1.P1.A".into() }));
        assert!(events.contains(&BomEvent::StatusChanged {
            node: primary,
            from: ItemStatus::Active,
            to: ItemStatus::Inactive
        }));
        assert!(events.contains(&BomEvent::AlternateApplied { primary: Some(primary), alternate }));
        assert_eq!(session.recompute().rollup.total_cost, 1899.0);
        assert!(session.candidate_alternates(&catalog, primary).unwrap().is_empty());
    }

    #[test]
    fn test_removing_applied_alternate_restores_primary() {
        let (mut session, group) = session();
        let primary = session
            .add_part(group, PartAttributes::new("CPU-A", "CPU A", 2599.0))
            .unwrap();
        let alternate = session
            .add_part(primary, PartAttributes::new("CPU-B", "CPU B", 1899.0).with_status(ItemStatus::Inactive))
            .unwrap();
        session.apply_alternate(AlternateChoice::Existing(alternate)).unwrap();
        session.drain_events();

        session.remove(alternate).unwrap();
        let events = session.drain_events();
        assert!(matches!(events[0], BomEvent::NodeRemoved { count: 1, .. }));
        assert!(events.contains(&BomEvent::StatusChanged {
            node: primary,
            from: ItemStatus::Inactive,
            to: ItemStatus::Active
        }));
        assert_eq!(session.recompute().rollup.total_cost, 2599.0);
        assert!(session.views().report.issues.is_empty());
    }

    #[test]
    fn test_failed_operation_keeps_session_clean() {
        let (mut session, group) = session();
        let result = session.add_part(group, PartAttributes::new("", "Nameless", 1.0));
        assert!(result.is_err());
        assert!(!session.is_dirty());
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn test_session_from_catalog_uses_configured_mode() {
        let (session, _) = session();
        let catalog = StaticCatalog::new().with_template("server", session.into_tree());
        let config = EngineConfig { validation_mode: ValidationMode::Draft, ..EngineConfig::default() };

        let session = BomSession::from_catalog(&catalog, "server", &config).unwrap();
        assert!(session.views().report.is_valid);
        assert!(BomSession::from_catalog(&catalog, "laptop", &config).is_err());
    }
}
