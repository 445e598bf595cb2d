//! Substitution State Machine
//!
//! The only mutation path for part status. Every transition operates on a
//! whole substitute group: the group's attributes are copied, the copy is
//! transformed, checked for the single-effective-part rule, and only then
//! written back. A failed transition leaves the tree untouched.

use bomsync_models::{BomError, BomResult, ItemStatus, Level, Lifecycle, NodeId, PartAttributes};
use serde::{Deserialize, Serialize};

use crate::tree::{BomTree, SubstituteGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Deprecate,
    Enable,
    ApplyAlternate,
    UpdateCost,
    SetLifecycle,
    SetCertifications,
    Reconcile,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deprecate => write!(f, "deprecate"),
            Self::Enable => write!(f, "enable"),
            Self::ApplyAlternate => write!(f, "apply_alternate"),
            Self::UpdateCost => write!(f, "update_cost"),
            Self::SetLifecycle => write!(f, "set_lifecycle"),
            Self::SetCertifications => write!(f, "set_certifications"),
            Self::Reconcile => write!(f, "reconcile"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub node: NodeId,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Primary of the affected group, when the target is a part in a group.
    pub primary: Option<NodeId>,
    /// The Active member after the transition, if any.
    pub effective: Option<NodeId>,
    /// Alternate inserted from a catalog by this transition.
    pub inserted: Option<NodeId>,
    pub changes: Vec<StatusChange>,
}

impl Transition {
    /// True when the group was left without an Active member and the caller
    /// has to pick an alternate.
    pub fn needs_alternate(&self) -> bool {
        matches!(self.kind, TransitionKind::Deprecate) && self.effective.is_none()
    }
}

/// Target of an ApplyAlternate command.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternateChoice {
    /// An alternate already in the tree.
    Existing(NodeId),
    /// A part picked from an external catalog for `primary`. Reuses an
    /// existing alternate with the same part number, otherwise inserts it.
    Catalog { primary: NodeId, attributes: PartAttributes },
}

/// Target state of one group member for [`BomTree::reconcile_group`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberState {
    pub node: NodeId,
    pub status: ItemStatus,
    pub lifecycle: Lifecycle,
    /// Quantity for an Active target; ignored otherwise.
    pub quantity: f64,
}

struct StagedGroup {
    primary: NodeId,
    members: Vec<(NodeId, PartAttributes)>,
}

impl StagedGroup {
    fn primary_mut(&mut self) -> &mut PartAttributes {
        &mut self.members[0].1
    }

    fn alternates_mut(&mut self) -> impl Iterator<Item = &mut (NodeId, PartAttributes)> {
        self.members.iter_mut().skip(1)
    }

    fn active(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|(_, a)| a.status.is_active())
            .map(|(id, _)| *id)
            .collect()
    }
}

impl BomTree {
    fn stage(&self, group: &SubstituteGroup) -> BomResult<StagedGroup> {
        let members = group
            .members()
            .map(|id| {
                let attributes = self
                    .node(id)?
                    .attributes()
                    .cloned()
                    .ok_or_else(|| BomError::node_not_found(format!("part {}", id)))?;
                Ok((id, attributes))
            })
            .collect::<BomResult<Vec<_>>>()?;
        Ok(StagedGroup { primary: group.primary, members })
    }

    fn commit(&mut self, kind: TransitionKind, staged: StagedGroup) -> BomResult<Transition> {
        let active = staged.active();
        if active.len() > 1 {
            let position = self.node(staged.primary)?.position.clone();
            return Err(BomError::group_violation(
                position,
                format!("{} would leave {} active members", kind, active.len()),
            ));
        }

        let mut changes = Vec::new();
        for (id, attributes) in staged.members {
            let slot = self.attributes_mut(id)?;
            if slot.status != attributes.status {
                changes.push(StatusChange { node: id, from: slot.status, to: attributes.status });
            }
            *slot = attributes;
        }

        let transition = Transition {
            kind,
            primary: Some(staged.primary),
            effective: active.first().copied(),
            inserted: None,
            changes,
        };
        tracing::debug!(
            kind = %kind,
            primary = %staged.primary,
            changed = transition.changes.len(),
            "Substitution transition committed"
        );
        Ok(transition)
    }

    fn require_level(&self, id: NodeId, expected: Level) -> BomResult<()> {
        let level = self.node(id)?.level();
        if level != expected {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }
        Ok(())
    }

    fn governing_group(&self, alternate: NodeId) -> BomResult<SubstituteGroup> {
        self.require_level(alternate, Level::Alternate)?;
        let primary = self.governing_primary(alternate).ok_or_else(|| {
            BomError::group_violation(
                self.get(alternate).map(|n| n.position.clone()).unwrap_or_default(),
                "alternate has no governing primary",
            )
        })?;
        self.group_of(primary)
    }

    /// Deprecates a primary. When no alternate is Active the first alternate
    /// (insertion order) is promoted; with no alternates the group is left
    /// without an effective part.
    pub fn deprecate(&mut self, primary: NodeId) -> BomResult<Transition> {
        self.require_level(primary, Level::Primary)?;
        let group = self.group_of(primary)?;
        let mut staged = self.stage(&group)?;

        staged.primary_mut().deactivate(ItemStatus::Deprecated);
        let has_active_alternate = staged.alternates_mut().any(|(_, a)| a.status.is_active());
        if !has_active_alternate {
            if let Some((_, first)) = staged.alternates_mut().next() {
                first.activate();
            }
        }

        let transition = self.commit(TransitionKind::Deprecate, staged)?;
        if transition.needs_alternate() {
            tracing::warn!(primary = %primary, "Primary deprecated without an alternate; group has no effective part");
        }
        Ok(transition)
    }

    /// Makes a primary the effective part again, superseding every alternate.
    pub fn enable(&mut self, primary: NodeId) -> BomResult<Transition> {
        self.require_level(primary, Level::Primary)?;
        let group = self.group_of(primary)?;
        let mut staged = self.stage(&group)?;

        staged.primary_mut().activate();
        for (_, alternate) in staged.alternates_mut() {
            alternate.deactivate(ItemStatus::Inactive);
        }
        self.commit(TransitionKind::Enable, staged)
    }

    /// Makes an alternate the effective part; every other member goes Inactive.
    pub fn apply_alternate(&mut self, choice: AlternateChoice) -> BomResult<Transition> {
        let (target, inserted) = match choice {
            AlternateChoice::Existing(id) => (id, None),
            AlternateChoice::Catalog { primary, attributes } => {
                self.require_level(primary, Level::Primary)?;
                let group = self.group_of(primary)?;
                let existing = group.alternates.iter().copied().find(|id| {
                    self.get(*id)
                        .and_then(|n| n.attributes())
                        .is_some_and(|a| a.part_number == attributes.part_number)
                });
                match existing {
                    Some(id) => (id, None),
                    None => {
                        let candidate = attributes.with_status(ItemStatus::Inactive);
                        let id = self.add_part(primary, candidate)?;
                        (id, Some(id))
                    }
                }
            }
        };

        let group = self.governing_group(target)?;
        let mut staged = self.stage(&group)?;
        for (id, attributes) in staged.members.iter_mut() {
            if *id == target {
                attributes.activate();
            } else {
                attributes.deactivate(ItemStatus::Inactive);
            }
        }

        let mut transition = self.commit(TransitionKind::ApplyAlternate, staged)?;
        transition.inserted = inserted;
        Ok(transition)
    }

    /// Flips a part between effective and not effective.
    pub fn toggle_status(&mut self, id: NodeId) -> BomResult<Transition> {
        let node = self.node(id)?;
        let active = node.is_active_part();
        match node.level() {
            Level::Primary if active => self.deprecate(id),
            Level::Primary => self.enable(id),
            Level::Alternate if active => {
                let group = self.governing_group(id)?;
                self.enable(group.primary)
            }
            Level::Alternate => self.apply_alternate(AlternateChoice::Existing(id)),
            level => Err(BomError::InvalidLevel { level: level.as_u8() }),
        }
    }

    /// Moves several members of the group governed by `primary` to the given
    /// states in one step. Members without a target keep their state.
    pub fn reconcile_group(&mut self, primary: NodeId, targets: &[MemberState]) -> BomResult<Transition> {
        self.require_level(primary, Level::Primary)?;
        let group = self.group_of(primary)?;
        let mut staged = self.stage(&group)?;

        for target in targets {
            let Some((_, attributes)) = staged.members.iter_mut().find(|(id, _)| *id == target.node) else {
                let position = self.node(target.node)?.position.clone();
                return Err(BomError::group_violation(position, format!("not a member of group {}", primary)));
            };
            if target.status.is_active() {
                attributes.activate();
                if target.quantity > 0.0 {
                    attributes.quantity = target.quantity;
                }
            } else {
                attributes.deactivate(target.status);
            }
            attributes.lifecycle = target.lifecycle;
        }
        self.commit(TransitionKind::Reconcile, staged)
    }

    fn single_part_transition(&self, kind: TransitionKind, id: NodeId) -> Transition {
        let primary = match self.get(id).map(|n| n.level()) {
            Some(Level::Primary) => Some(id),
            Some(Level::Alternate) => self.governing_primary(id),
            _ => None,
        };
        Transition { kind, primary, effective: None, inserted: None, changes: Vec::new() }
    }

    /// Sets unit cost and quantity. Active parts need a positive quantity;
    /// non-active parts keep quantity 0 and remember the new value.
    pub fn update_cost(&mut self, id: NodeId, unit_cost: f64, quantity: f64) -> BomResult<Transition> {
        let position = self.node(id)?.position.clone();
        if !unit_cost.is_finite() || unit_cost < 0.0 {
            return Err(BomError::invalid_attributes("unit_cost", format!("{} is not a valid cost", unit_cost)));
        }
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(BomError::invalid_quantity(position, quantity));
        }

        let attributes = self.attributes_mut(id)?;
        if attributes.status.is_active() {
            if quantity <= 0.0 {
                return Err(BomError::invalid_quantity(position, quantity));
            }
            attributes.quantity = quantity;
        } else {
            if quantity > 0.0 {
                attributes.restore_quantity = Some(quantity);
            }
            attributes.quantity = 0.0;
        }
        attributes.unit_cost = unit_cost;
        Ok(self.single_part_transition(TransitionKind::UpdateCost, id))
    }

    pub fn set_lifecycle(&mut self, id: NodeId, lifecycle: Lifecycle) -> BomResult<Transition> {
        self.attributes_mut(id)?.lifecycle = lifecycle;
        Ok(self.single_part_transition(TransitionKind::SetLifecycle, id))
    }

    /// Replaces the compliance markers of a part.
    pub fn set_certifications(&mut self, id: NodeId, certifications: Vec<String>) -> BomResult<Transition> {
        let mut cleaned: Vec<String> = Vec::with_capacity(certifications.len());
        for certification in certifications {
            let trimmed = certification.trim();
            if trimmed.is_empty() {
                return Err(BomError::invalid_attributes("certifications", "empty certification marker"));
            }
            if !cleaned.iter().any(|c| c == trimmed) {
                cleaned.push(trimmed.to_string());
            }
        }

        self.attributes_mut(id)?.certifications = cleaned;
        Ok(self.single_part_transition(TransitionKind::SetCertifications, id))
    }
}
