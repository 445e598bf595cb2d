//! BOM node domain models.
//!
//! This module defines the node shapes stored in a BOM tree: the seven
//! fixed levels, container vs. part variants, and the part attributes
//! (cost, supplier, lifecycle, item status) that the substitution and
//! rollup logic operate on.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{BomError, BomResult};

/// Stable arena identifier of a node. Never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed meaning of each tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Unit = 1,
    Module = 2,
    Submodule = 3,
    Family = 4,
    Group = 5,
    Primary = 6,
    Alternate = 7,
}

impl Level {
    pub fn from_u8(level: u8) -> BomResult<Self> {
        match level {
            1 => Ok(Self::Unit),
            2 => Ok(Self::Module),
            3 => Ok(Self::Submodule),
            4 => Ok(Self::Family),
            5 => Ok(Self::Group),
            6 => Ok(Self::Primary),
            7 => Ok(Self::Alternate),
            _ => Err(BomError::InvalidLevel { level }),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Levels 6 and 7 carry part attributes.
    pub fn is_part(self) -> bool {
        matches!(self, Self::Primary | Self::Alternate)
    }

    pub fn is_container(self) -> bool {
        !self.is_part()
    }

    /// Level of a child placed directly under a node of this level.
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Alternate => None,
            other => Self::from_u8(other.as_u8() + 1).ok(),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::Module => write!(f, "module"),
            Self::Submodule => write!(f, "submodule"),
            Self::Family => write!(f, "family"),
            Self::Group => write!(f, "group"),
            Self::Primary => write!(f, "primary"),
            Self::Alternate => write!(f, "alternate"),
        }
    }
}

/// Lifecycle stage reported by engineering or the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    PhaseOut,
    Obsolete,
    New,
}

impl Lifecycle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "active" => Some(Self::Active),
            "phaseout" => Some(Self::PhaseOut),
            "obsolete" => Some(Self::Obsolete),
            "new" => Some(Self::New),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PhaseOut => write!(f, "phase_out"),
            Self::Obsolete => write!(f, "obsolete"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Item status of a part within its substitute group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Active,
    Inactive,
    Deprecated,
    Replaced,
}

impl ItemStatus {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "deprecated" => Some(Self::Deprecated),
            "replaced" => Some(Self::Replaced),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Deprecated => write!(f, "deprecated"),
            Self::Replaced => write!(f, "replaced"),
        }
    }
}

/// Attributes carried by primary (L6) and alternate (L7) parts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PartAttributes {
    #[validate(length(min = 1, max = 100, message = "Part number must be between 1 and 100 characters"))]
    pub part_number: String,
    #[validate(length(min = 1, max = 255, message = "Part name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(range(min = 0.0, message = "Quantity must not be negative"))]
    pub quantity: f64,
    #[validate(length(max = 20))]
    pub unit: String,
    #[validate(range(min = 0.0, message = "Unit cost must not be negative"))]
    pub unit_cost: f64,
    #[validate(length(max = 255))]
    pub supplier: String,
    pub variance_percent: f64,
    pub lifecycle: Lifecycle,
    pub status: ItemStatus,
    /// Position of the governing primary; only set on alternates.
    pub substitute_group: Option<String>,
    #[validate(custom = "validate_certifications")]
    #[serde(default)]
    pub certifications: Vec<String>,
    /// Last positive quantity, restored when the part becomes effective again.
    #[serde(default)]
    pub restore_quantity: Option<f64>,
}

fn validate_certifications(certifications: &[String]) -> Result<(), ValidationError> {
    if certifications.iter().any(|c| c.trim().is_empty()) {
        return Err(ValidationError::new("empty_certification"));
    }
    Ok(())
}

impl Default for PartAttributes {
    fn default() -> Self {
        Self {
            part_number: String::new(),
            name: String::new(),
            quantity: 1.0,
            unit: "pcs".to_string(),
            unit_cost: 0.0,
            supplier: String::new(),
            variance_percent: 0.0,
            lifecycle: Lifecycle::Active,
            status: ItemStatus::Active,
            substitute_group: None,
            certifications: Vec::new(),
            restore_quantity: None,
        }
    }
}

impl PartAttributes {
    /// Creates an Active part with quantity 1.
    pub fn new(part_number: impl Into<String>, name: impl Into<String>, unit_cost: f64) -> Self {
        Self {
            part_number: part_number.into(),
            name: name.into(),
            unit_cost,
            ..Self::default()
        }
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = supplier.into();
        self
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_variance(mut self, variance_percent: f64) -> Self {
        self.variance_percent = variance_percent;
        self
    }

    pub fn with_certification(mut self, certification: impl Into<String>) -> Self {
        let certification = certification.into();
        if !self.certifications.contains(&certification) {
            self.certifications.push(certification);
        }
        self
    }

    /// Extended cost of this line.
    pub fn line_cost(&self) -> f64 {
        self.unit_cost * self.quantity
    }

    /// Quantity to use when the part becomes effective again.
    pub fn effective_quantity(&self) -> f64 {
        if self.quantity > 0.0 {
            self.quantity
        } else {
            self.restore_quantity.filter(|q| *q > 0.0).unwrap_or(1.0)
        }
    }

    /// Zeroes the quantity, remembering the last positive value.
    pub fn park_quantity(&mut self) {
        if self.quantity > 0.0 {
            self.restore_quantity = Some(self.quantity);
        }
        self.quantity = 0.0;
    }

    pub fn activate(&mut self) {
        self.quantity = self.effective_quantity();
        self.status = ItemStatus::Active;
        self.lifecycle = Lifecycle::Active;
    }

    pub fn deactivate(&mut self, status: ItemStatus) {
        self.park_quantity();
        self.status = status;
        self.lifecycle = Lifecycle::PhaseOut;
    }
}

/// Node payload: pure containers for levels 1-5, parts for levels 6-7.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NodeKind {
    Container { level: Level, label: String },
    Part { level: Level, attributes: PartAttributes },
}

/// A node stored in a BOM tree arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BomNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub position: String,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

impl BomNode {
    pub fn container(id: NodeId, parent: Option<NodeId>, position: String, level: Level, label: impl Into<String>) -> BomResult<Self> {
        if !level.is_container() {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }
        Ok(Self {
            id,
            parent,
            position,
            kind: NodeKind::Container { level, label: label.into() },
            children: Vec::new(),
        })
    }

    pub fn part(id: NodeId, parent: Option<NodeId>, position: String, level: Level, attributes: PartAttributes) -> BomResult<Self> {
        if !level.is_part() {
            return Err(BomError::InvalidLevel { level: level.as_u8() });
        }
        Ok(Self {
            id,
            parent,
            position,
            kind: NodeKind::Part { level, attributes },
            children: Vec::new(),
        })
    }

    pub fn level(&self) -> Level {
        match &self.kind {
            NodeKind::Container { level, .. } | NodeKind::Part { level, .. } => *level,
        }
    }

    pub fn is_part(&self) -> bool {
        matches!(self.kind, NodeKind::Part { .. })
    }

    pub fn attributes(&self) -> Option<&PartAttributes> {
        match &self.kind {
            NodeKind::Part { attributes, .. } => Some(attributes),
            NodeKind::Container { .. } => None,
        }
    }

    pub fn attributes_mut(&mut self) -> Option<&mut PartAttributes> {
        match &mut self.kind {
            NodeKind::Part { attributes, .. } => Some(attributes),
            NodeKind::Container { .. } => None,
        }
    }

    /// Container label or part display name.
    pub fn display_name(&self) -> &str {
        match &self.kind {
            NodeKind::Container { label, .. } => label,
            NodeKind::Part { attributes, .. } => &attributes.name,
        }
    }

    pub fn status(&self) -> Option<ItemStatus> {
        self.attributes().map(|a| a.status)
    }

    pub fn is_active_part(&self) -> bool {
        self.status().is_some_and(ItemStatus::is_active)
    }
}

/// One row of the flattened parts list handed to export collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatPart {
    pub position: String,
    pub level: u8,
    pub part_number: String,
    pub part_name: String,
    pub quantity: f64,
    pub unit: String,
    pub cost: f64,
    pub supplier: String,
    pub variance: f64,
    pub lifecycle: Lifecycle,
    pub item_status: ItemStatus,
}

impl FlatPart {
    pub fn from_node(node: &BomNode) -> Option<Self> {
        let attributes = node.attributes()?;
        Some(Self {
            position: node.position.clone(),
            level: node.level().as_u8(),
            part_number: attributes.part_number.clone(),
            part_name: attributes.name.clone(),
            quantity: attributes.quantity,
            unit: attributes.unit.clone(),
            cost: attributes.unit_cost,
            supplier: attributes.supplier.clone(),
            variance: attributes.variance_percent,
            lifecycle: attributes.lifecycle,
            item_status: attributes.status,
        })
    }
}
