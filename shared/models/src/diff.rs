//! Reconciliation records produced by comparing a local BOM with an ERP snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of discrepancy detected at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffType {
    /// Present locally, absent in the external snapshot.
    Add,
    /// Present in the external snapshot, absent locally.
    Delete,
    LifecycleChange,
    CostChange,
    ComplianceGap,
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Delete => write!(f, "delete"),
            Self::LifecycleChange => write!(f, "lifecycle_change"),
            Self::CostChange => write!(f, "cost_change"),
            Self::ComplianceGap => write!(f, "compliance_gap"),
        }
    }
}

/// Severity shared by diff records and validation issues.
///
/// Ordered so that `High` sorts first in a descending sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One detected discrepancy. Treated as an immutable value; the sync
/// orchestrator tracks resolution and hands out copies with the flags set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffRecord {
    pub id: Uuid,
    pub position: String,
    pub part_name: String,
    pub diff_type: DiffType,
    pub local_value: Option<String>,
    pub external_value: Option<String>,
    pub delta_cost: f64,
    pub compliance_note: Option<String>,
    pub severity: Severity,
    pub fixed: bool,
    pub ignored: bool,
    pub detected_at: DateTime<Utc>,
}

impl DiffRecord {
    pub fn new(position: impl Into<String>, part_name: impl Into<String>, diff_type: DiffType, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            position: position.into(),
            part_name: part_name.into(),
            diff_type,
            local_value: None,
            external_value: None,
            delta_cost: 0.0,
            compliance_note: None,
            severity,
            fixed: false,
            ignored: false,
            detected_at: Utc::now(),
        }
    }

    pub fn with_values(mut self, local: Option<String>, external: Option<String>) -> Self {
        self.local_value = local;
        self.external_value = external;
        self
    }

    pub fn with_delta_cost(mut self, delta_cost: f64) -> Self {
        self.delta_cost = delta_cost;
        self
    }

    pub fn with_compliance_note(mut self, note: impl Into<String>) -> Self {
        self.compliance_note = Some(note.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.fixed || self.ignored
    }

    /// Copy of this record carrying the given resolution flags.
    pub fn with_resolution(&self, fixed: bool, ignored: bool) -> Self {
        Self {
            fixed,
            ignored,
            ..self.clone()
        }
    }
}
