//! Arena-backed BOM tree.
//!
//! Nodes live in a slot vector addressed by [`NodeId`]; parent/child links are
//! ids, never references. Removed slots stay empty so an id can never alias a
//! different node later.

use std::collections::HashMap;

use bomsync_models::{BomError, BomNode, BomResult, FlatPart, ItemStatus, Level, NodeId, NodeKind, PartAttributes};
use bomsync_utils::validate_model;
use serde::{Deserialize, Serialize};

use crate::position::{alternate_anchor, generate_position};
use crate::substitution::Transition;

/// One primary part plus the alternates it governs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstituteGroup {
    pub primary: NodeId,
    pub alternates: Vec<NodeId>,
}

impl SubstituteGroup {
    /// Primary first, then alternates in stable order.
    pub fn members(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.primary).chain(self.alternates.iter().copied())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BomTree {
    nodes: Vec<Option<BomNode>>,
    root: Option<NodeId>,
}

impl BomTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree holding only the level-1 root.
    pub fn with_root(label: impl Into<String>) -> Self {
        let mut tree = Self::new();
        let id = NodeId(0);
        let root = BomNode {
            id,
            parent: None,
            position: crate::position::ROOT_POSITION.to_string(),
            kind: NodeKind::Container { level: Level::Unit, label: label.into() },
            children: Vec::new(),
        };
        tree.nodes.push(Some(root));
        tree.root = Some(id);
        tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&BomNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut BomNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Like [`get`](Self::get) but reports a missing node as an error.
    pub fn node(&self, id: NodeId) -> BomResult<&BomNode> {
        self.get(id).ok_or_else(|| BomError::node_not_found(id))
    }

    pub(crate) fn attributes_mut(&mut self, id: NodeId) -> BomResult<&mut PartAttributes> {
        self.get_mut(id)
            .ok_or_else(|| BomError::node_not_found(id))?
            .attributes_mut()
            .ok_or_else(|| BomError::node_not_found(format!("part {}", id)))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &BomNode> {
        self.nodes.iter().flatten()
    }

    pub fn part_nodes(&self) -> impl Iterator<Item = &BomNode> {
        self.nodes().filter(|n| n.is_part())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Node ids reachable from the root, parents before children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Node ids reachable from the root, children before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, bool)> = self.root.map(|r| (r, false)).into_iter().collect();
        while let Some((id, expanded)) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(node.children.iter().rev().map(|c| (*c, false)));
            }
        }
        order
    }

    /// First live node carrying `position`, in pre-order.
    pub fn find_by_position(&self, position: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| self.get(*id).is_some_and(|n| n.position == position))
    }

    /// Position -> node map keeping the first node for duplicated positions.
    pub fn position_index(&self) -> HashMap<&str, NodeId> {
        let mut index = HashMap::new();
        for id in self.preorder() {
            if let Some(node) = self.get(id) {
                index.entry(node.position.as_str()).or_insert(id);
            }
        }
        index
    }

    fn position_taken(&self, position: &str) -> bool {
        self.nodes().any(|n| n.position == position)
    }

    /// Next position under `parent` that collides with no live node.
    fn next_free_position(&self, parent: &BomNode, level: Level) -> BomResult<String> {
        let mut index = parent.children.len() + 1;
        loop {
            let candidate = generate_position(level.as_u8(), Some(&parent.position), index, level == Level::Alternate)?;
            if !self.position_taken(&candidate) {
                return Ok(candidate);
            }
            index += 1;
        }
    }

    fn push_node(&mut self, parent: NodeId, position: String, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(BomNode {
            id,
            parent: Some(parent),
            position,
            kind,
            children: Vec::new(),
        }));
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(id);
        }
        id
    }

    /// Adds a container one level below `parent` (levels 2-5).
    pub fn add_container(&mut self, parent: NodeId, label: impl Into<String>) -> BomResult<NodeId> {
        let parent_node = self.node(parent)?;
        let level = parent_node
            .level()
            .child()
            .ok_or(BomError::InvalidLevel { level: parent_node.level().as_u8() + 1 })?;
        if !level.is_container() {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }

        let position = self.next_free_position(parent_node, level)?;
        let kind = NodeKind::Container { level, label: label.into() };
        let id = self.push_node(parent, position, kind);
        tracing::debug!(node = %id, level = %level, "Container added");
        Ok(id)
    }

    /// Adds a part below `parent`: a primary under a group (level 5) or an
    /// alternate under a primary (level 6).
    ///
    /// Non-active parts get quantity 0; an Active part needs a positive
    /// quantity and may not join a group that already has an Active member.
    pub fn add_part(&mut self, parent: NodeId, attributes: PartAttributes) -> BomResult<NodeId> {
        let parent_node = self.node(parent)?;
        let level = parent_node
            .level()
            .child()
            .ok_or(BomError::InvalidLevel { level: parent_node.level().as_u8() + 1 })?;
        if !level.is_part() {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }

        let position = self.next_free_position(parent_node, level)?;
        let mut attributes = self.prepare_part(&position, attributes)?;

        if level == Level::Alternate {
            attributes.substitute_group = Some(parent_node.position.clone());
            if attributes.status.is_active() {
                let group = self.group_of(parent)?;
                if let Some(active) = self.active_members(&group).first() {
                    return Err(BomError::group_violation(
                        &position,
                        format!("group already has active member {}", active),
                    ));
                }
            }
        } else {
            attributes.substitute_group = None;
        }

        let id = self.push_node(parent, position, NodeKind::Part { level, attributes });
        tracing::debug!(node = %id, level = %level, "Part added");
        Ok(id)
    }

    /// Validates attributes and applies the quantity rule for the given status.
    fn prepare_part(&self, position: &str, mut attributes: PartAttributes) -> BomResult<PartAttributes> {
        validate_model(&attributes)?;
        if attributes.status.is_active() {
            if attributes.quantity <= 0.0 {
                return Err(BomError::invalid_quantity(position, attributes.quantity));
            }
        } else {
            attributes.park_quantity();
        }
        Ok(attributes)
    }

    /// Inserts a node at an explicit position, used when restoring nodes from
    /// an external snapshot. Parts are inserted non-active; the caller
    /// activates them through the state machine.
    pub(crate) fn insert_at(&mut self, parent: NodeId, position: &str, kind: NodeKind) -> BomResult<NodeId> {
        let parent_node = self.node(parent)?;
        let parent_level = parent_node.level();
        let level = match &kind {
            NodeKind::Container { level, .. } | NodeKind::Part { level, .. } => *level,
        };
        let expected = parent_level.child();
        let sibling_alternate = level == Level::Alternate && parent_level == Level::Group;
        if expected != Some(level) && !sibling_alternate {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }
        if self.position_taken(position) {
            return Err(BomError::duplicate_position(position));
        }

        let kind = match kind {
            NodeKind::Part { level, attributes } => {
                let mut attributes = self.prepare_part(position, attributes)?;
                if attributes.status.is_active() {
                    attributes.status = ItemStatus::Inactive;
                    attributes.park_quantity();
                }
                NodeKind::Part { level, attributes }
            }
            container => container,
        };
        Ok(self.push_node(parent, position.to_string(), kind))
    }

    /// Removes a node. Containers must be empty; removing a primary removes
    /// its whole substitute group.
    pub fn remove(&mut self, id: NodeId) -> BomResult<Vec<BomNode>> {
        self.remove_with_handoff(id).map(|(removed, _)| removed)
    }

    /// Like [`remove`](Self::remove), also returning the transition that
    /// handed the group to another member when the removed node was the
    /// effective alternate. A Deprecated primary passes the group to the next
    /// alternate in insertion order; any other primary takes it back.
    pub fn remove_with_handoff(&mut self, id: NodeId) -> BomResult<(Vec<BomNode>, Option<Transition>)> {
        let node = self.node(id)?;
        let mut doomed = vec![id];
        let mut handoff = None;
        match node.level() {
            level if level.is_container() => {
                if !node.children.is_empty() {
                    return Err(BomError::NodeHasChildren { position: node.position.clone() });
                }
            }
            Level::Primary => doomed.extend(self.group_of(id)?.alternates),
            _ if node.is_active_part() => handoff = self.governing_primary(id),
            _ => {}
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for target in doomed {
            if let Some(parent) = self.parent(target).and_then(|p| self.get_mut(p)) {
                parent.children.retain(|c| *c != target);
            }
            if self.root == Some(target) {
                self.root = None;
            }
            if let Some(node) = self.nodes.get_mut(target.0).and_then(Option::take) {
                removed.push(node);
            }
        }
        tracing::debug!(node = %id, removed = removed.len(), "Node removed");

        let transition = match handoff {
            Some(primary) if self.get(primary).and_then(BomNode::status) == Some(ItemStatus::Deprecated) => {
                Some(self.deprecate(primary)?)
            }
            Some(primary) => Some(self.enable(primary)?),
            None => None,
        };
        if let Some(transition) = &transition {
            tracing::debug!(primary = ?transition.primary, effective = ?transition.effective, "Effective alternate removed; group handed over");
        }
        Ok((removed, transition))
    }

    /// Primary governing an alternate: its parent when that is a primary,
    /// otherwise the sibling primary named by its substitute-group tag or
    /// by its position anchor.
    pub fn governing_primary(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        if node.level() != Level::Alternate {
            return None;
        }
        let parent = self.get(node.parent?)?;
        if parent.level() == Level::Primary {
            return Some(parent.id);
        }

        let siblings: Vec<&BomNode> = parent
            .children
            .iter()
            .filter_map(|c| self.get(*c))
            .filter(|n| n.level() == Level::Primary)
            .collect();
        let tag = node.attributes().and_then(|a| a.substitute_group.as_deref());
        tag.and_then(|tag| siblings.iter().find(|s| s.position == tag))
            .or_else(|| {
                let anchor = alternate_anchor(&node.position)?;
                siblings.iter().find(|s| s.position == anchor)
            })
            .map(|s| s.id)
    }

    /// The substitute group governed by `primary`.
    pub fn group_of(&self, primary: NodeId) -> BomResult<SubstituteGroup> {
        let node = self.node(primary)?;
        if node.level() != Level::Primary {
            return Err(BomError::InvalidLevel { level: node.level().as_u8() });
        }

        let mut alternates: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|c| self.get(*c).is_some_and(|n| n.level() == Level::Alternate))
            .collect();
        if let Some(parent) = node.parent {
            alternates.extend(
                self.children(parent)
                    .iter()
                    .copied()
                    .filter(|c| self.governing_primary(*c) == Some(primary)),
            );
        }
        Ok(SubstituteGroup { primary, alternates })
    }

    /// Every substitute group in pre-order of its primary.
    pub fn groups(&self) -> Vec<SubstituteGroup> {
        self.preorder()
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(|n| n.level() == Level::Primary))
            .filter_map(|id| self.group_of(id).ok())
            .collect()
    }

    /// Members of `group` whose item status is Active.
    pub fn active_members(&self, group: &SubstituteGroup) -> Vec<NodeId> {
        group
            .members()
            .filter(|id| self.get(*id).is_some_and(BomNode::is_active_part))
            .collect()
    }

    /// Flattened parts list in pre-order.
    pub fn flatten_parts(&self) -> Vec<FlatPart> {
        self.preorder()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter_map(FlatPart::from_node)
            .collect()
    }

    /// Loads a tree serialized with [`to_json`](Self::to_json), such as an
    /// exported ERP snapshot.
    pub fn from_json(json: &str) -> BomResult<Self> {
        let tree: Self = serde_json::from_str(json)?;
        if let Some(root) = tree.root {
            tree.node(root)?;
        }
        for node in tree.nodes() {
            if tree.nodes.get(node.id.0).and_then(Option::as_ref).map(|n| n.id) != Some(node.id) {
                return Err(BomError::node_not_found(node.id));
            }
            if let Some(parent) = node.parent {
                tree.node(parent)?;
            }
        }
        tree.check_links()?;
        Ok(tree)
    }

    /// Every live node must be reached from the root exactly once, through
    /// child links that agree with the child's parent link.
    fn check_links(&self) -> BomResult<()> {
        let Some(root) = self.root else {
            return match self.nodes().next() {
                Some(node) => Err(BomError::missing_parent(format!("{} is in a tree without a root", node.position))),
                None => Ok(()),
            };
        };
        if self.node(root)?.parent.is_some() {
            return Err(BomError::invalid_attributes("parent", format!("root {} has a parent", root)));
        }

        let mut seen = vec![false; self.nodes.len()];
        seen[root.0] = true;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for &child in &self.node(id)?.children {
                if self.node(child)?.parent != Some(id) {
                    return Err(BomError::invalid_attributes(
                        "children",
                        format!("{} lists {} as a child but is not its parent", id, child),
                    ));
                }
                if seen[child.0] {
                    return Err(BomError::invalid_attributes("children", format!("{} is linked more than once", child)));
                }
                seen[child.0] = true;
                stack.push(child);
            }
        }

        match self.nodes().find(|n| !seen[n.id.0]) {
            Some(node) => Err(BomError::missing_parent(format!("{} is not reachable from the root", node.position))),
            None => Ok(()),
        }
    }

    pub fn to_json(&self) -> BomResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
