use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BomError {
    #[error("Invalid level: {level}")]
    InvalidLevel { level: u8 },

    #[error("Missing parent: {context}")]
    MissingParent { context: String },

    #[error("Duplicate position: {position}")]
    DuplicatePosition { position: String },

    #[error("Invalid quantity {quantity} at {position}")]
    InvalidQuantity { position: String, quantity: f64 },

    #[error("Node not found: {node}")]
    NodeNotFound { node: String },

    #[error("Group invariant violation at {position}: {message}")]
    GroupInvariantViolation { position: String, message: String },

    #[error("External snapshot unavailable: {message}")]
    ExternalSnapshotUnavailable { message: String },

    #[error("Invalid part attributes: {field} - {message}")]
    InvalidAttributes { field: String, message: String },

    #[error("Node {position} still has children")]
    NodeHasChildren { position: String },

    #[error("Sibling index {index} out of range for level {level}")]
    SiblingIndexOutOfRange { level: u8, index: usize },

    #[error("Diff record not found: {id}")]
    DiffNotFound { id: Uuid },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl BomError {
    pub fn missing_parent(context: impl Into<String>) -> Self {
        Self::MissingParent {
            context: context.into(),
        }
    }

    pub fn duplicate_position(position: impl Into<String>) -> Self {
        Self::DuplicatePosition {
            position: position.into(),
        }
    }

    pub fn invalid_quantity(position: impl Into<String>, quantity: f64) -> Self {
        Self::InvalidQuantity {
            position: position.into(),
            quantity,
        }
    }

    pub fn node_not_found(node: impl ToString) -> Self {
        Self::NodeNotFound {
            node: node.to_string(),
        }
    }

    pub fn group_violation(position: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GroupInvariantViolation {
            position: position.into(),
            message: message.into(),
        }
    }

    pub fn snapshot_unavailable(message: impl Into<String>) -> Self {
        Self::ExternalSnapshotUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_attributes(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttributes {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidLevel { .. } => "INVALID_LEVEL",
            Self::MissingParent { .. } => "MISSING_PARENT",
            Self::DuplicatePosition { .. } => "DUPLICATE_POSITION",
            Self::InvalidQuantity { .. } => "INVALID_QUANTITY",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::GroupInvariantViolation { .. } => "GROUP_INVARIANT_VIOLATION",
            Self::ExternalSnapshotUnavailable { .. } => "EXTERNAL_SNAPSHOT_UNAVAILABLE",
            Self::InvalidAttributes { .. } => "INVALID_ATTRIBUTES",
            Self::NodeHasChildren { .. } => "NODE_HAS_CHILDREN",
            Self::SiblingIndexOutOfRange { .. } => "SIBLING_INDEX_OUT_OF_RANGE",
            Self::DiffNotFound { .. } => "DIFF_NOT_FOUND",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    /// Errors caused by a collaborator rather than by the request itself.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExternalSnapshotUnavailable { .. })
    }
}

pub type BomResult<T> = Result<T, BomError>;

impl From<serde_json::Error> for BomError {
    fn from(error: serde_json::Error) -> Self {
        Self::invalid_attributes("JSON", error.to_string())
    }
}
