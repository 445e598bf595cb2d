//! Fix suggestions
//!
//! Maps each diff record to a remediation and a confidence score. Scores
//! start from a per-kind heuristic and drift toward the observed acceptance
//! rate once enough outcomes are known.

use std::collections::HashMap;

use bomsync_models::{DiffRecord, DiffType};
use bomsync_utils::EngineConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::BomTree;

/// Outcomes needed before history influences confidence.
pub const MIN_HISTORY_SAMPLES: u32 = 3;

const BASE_WEIGHT: f64 = 0.7;
const HISTORY_WEIGHT: f64 = 0.3;

/// What applying a fix does to the local tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixAction {
    RemoveLocal,
    RestoreFromExternal,
    AdoptExternalLifecycle,
    AdoptExternalCost,
    AdoptExternalCertifications,
}

impl FixAction {
    pub fn for_diff(diff_type: DiffType) -> Self {
        match diff_type {
            DiffType::Add => Self::RemoveLocal,
            DiffType::Delete => Self::RestoreFromExternal,
            DiffType::LifecycleChange => Self::AdoptExternalLifecycle,
            DiffType::CostChange => Self::AdoptExternalCost,
            DiffType::ComplianceGap => Self::AdoptExternalCertifications,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub diff_id: Uuid,
    pub action: FixAction,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStats {
    pub succeeded: u32,
    pub failed: u32,
}

impl PatternStats {
    pub fn total(&self) -> u32 {
        self.succeeded + self.failed
    }
}

/// Fix outcomes per diff kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternHistory {
    outcomes: HashMap<DiffType, PatternStats>,
}

impl PatternHistory {
    pub fn record(&mut self, diff_type: DiffType, succeeded: bool) {
        let stats = self.outcomes.entry(diff_type).or_default();
        if succeeded {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
    }

    pub fn stats(&self, diff_type: DiffType) -> PatternStats {
        self.outcomes.get(&diff_type).copied().unwrap_or_default()
    }

    /// Success rate, once at least [`MIN_HISTORY_SAMPLES`] outcomes exist.
    pub fn acceptance_rate(&self, diff_type: DiffType) -> Option<f64> {
        let stats = self.stats(diff_type);
        (stats.total() >= MIN_HISTORY_SAMPLES).then(|| stats.succeeded as f64 / stats.total() as f64)
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    floor: f64,
    history: PatternHistory,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl SuggestionEngine {
    pub fn new(floor: f64) -> Self {
        Self { floor, history: PatternHistory::default() }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.suggestion_confidence_floor)
    }

    pub fn history(&self) -> &PatternHistory {
        &self.history
    }

    pub fn record_outcome(&mut self, diff_type: DiffType, succeeded: bool) {
        self.history.record(diff_type, succeeded);
    }

    /// Heuristic confidence before history is applied.
    pub fn base_confidence(record: &DiffRecord, external: &BomTree) -> f64 {
        match record.diff_type {
            DiffType::Delete => 0.9,
            DiffType::LifecycleChange => 0.85,
            DiffType::Add => 0.75,
            DiffType::ComplianceGap => 0.7,
            DiffType::CostChange => {
                let reference = external
                    .find_by_position(&record.position)
                    .and_then(|id| external.get(id))
                    .and_then(|n| n.attributes())
                    .map(|a| a.line_cost().abs())
                    .unwrap_or(0.0);
                if reference <= f64::EPSILON {
                    return 0.5;
                }
                match record.delta_cost.abs() / reference {
                    drift if drift <= 0.05 => 0.95,
                    drift if drift <= 0.25 => 0.8,
                    _ => 0.5,
                }
            }
        }
    }

    pub fn confidence(&self, record: &DiffRecord, external: &BomTree) -> f64 {
        let base = Self::base_confidence(record, external);
        let blended = match self.history.acceptance_rate(record.diff_type) {
            Some(rate) => BASE_WEIGHT * base + HISTORY_WEIGHT * rate,
            None => base,
        };
        blended.clamp(0.0, 1.0)
    }

    /// Suggestion for one record, or `None` when confidence is under the floor.
    pub fn suggest(&self, record: &DiffRecord, external: &BomTree) -> Option<FixSuggestion> {
        let confidence = self.confidence(record, external);
        if confidence < self.floor {
            tracing::debug!(diff = %record.id, confidence, "Suggestion withheld below floor");
            return None;
        }
        let action = FixAction::for_diff(record.diff_type);
        Some(FixSuggestion {
            diff_id: record.id,
            action,
            description: describe(record),
            confidence,
        })
    }

    pub fn suggest_all<'a>(
        &self,
        records: impl IntoIterator<Item = &'a DiffRecord>,
        external: &BomTree,
    ) -> Vec<FixSuggestion> {
        records
            .into_iter()
            .filter_map(|record| self.suggest(record, external))
            .collect()
    }
}

fn describe(record: &DiffRecord) -> String {
    let external = record.external_value.as_deref().unwrap_or("-");
    match record.diff_type {
        DiffType::Add => format!(
            "Remove {} at {}: it is not in the ERP snapshot",
            record.part_name, record.position
        ),
        DiffType::Delete => format!("Restore {} at {} from the ERP snapshot", record.part_name, record.position),
        DiffType::LifecycleChange => format!(
            "Set lifecycle of {} at {} to {}",
            record.part_name, record.position, external
        ),
        DiffType::CostChange => format!(
            "Update cost of {} at {} to {} (delta {:+.2})",
            record.part_name, record.position, external, record.delta_cost
        ),
        DiffType::ComplianceGap => format!(
            "Align certifications of {} at {} with ERP ({})",
            record.part_name,
            record.position,
            record.compliance_note.as_deref().unwrap_or("sets differ")
        ),
    }
}
