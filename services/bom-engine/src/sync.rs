//! Sync Orchestrator
//!
//! Drives reconciliation between a [`BomSession`] and an ERP snapshot:
//! single fixes, batches with progress and cancellation, and one-click sync
//! of every High-severity diff followed by a refresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bomsync_models::{BomError, BomResult, DiffRecord, Severity};
use bomsync_utils::EngineConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::DiffEngine;
use crate::events::BomEvent;
use crate::fix::FixEffect;
use crate::provider::SnapshotProvider;
use crate::session::BomSession;
use crate::suggestion::{FixSuggestion, SuggestionEngine};
use crate::tree::BomTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Idle,
    Syncing,
    Success,
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Shared cancellation flag for batch operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Reported after each item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub percent: f64,
    pub diff_id: Uuid,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixFailure {
    pub diff_id: Uuid,
    pub error: BomError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub fixed: usize,
    pub failed: usize,
    /// Records that were already fixed or ignored.
    pub skipped: usize,
    pub cancelled: bool,
    pub failures: Vec<FixFailure>,
}

impl BatchResult {
    pub fn processed(&self) -> usize {
        self.fixed + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Fixed(FixEffect),
    /// The record was already fixed or ignored; nothing was touched.
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneClickReport {
    pub batch: BatchResult,
    /// Diff count after the refresh, `None` when no refresh happened.
    pub refreshed_diffs: Option<usize>,
    pub refresh_error: Option<BomError>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Resolution {
    fixed: bool,
    ignored: bool,
}

pub struct SyncOrchestrator<P: SnapshotProvider> {
    provider: P,
    session: BomSession,
    external: BomTree,
    diff_engine: DiffEngine,
    suggestions: SuggestionEngine,
    diffs: Vec<DiffRecord>,
    resolutions: HashMap<Uuid, Resolution>,
    failures: HashMap<Uuid, BomError>,
    state: SyncState,
    finished_at: Option<DateTime<Utc>>,
    cooldown: Duration,
    cancel: CancelToken,
}

impl<P: SnapshotProvider> SyncOrchestrator<P> {
    /// Creates an orchestrator with no snapshot yet; call [`refresh`](Self::refresh)
    /// to pull one.
    pub fn new(session: BomSession, provider: P, config: &EngineConfig) -> Self {
        Self {
            provider,
            session,
            external: BomTree::new(),
            diff_engine: DiffEngine::from_config(config),
            suggestions: SuggestionEngine::from_config(config),
            diffs: Vec::new(),
            resolutions: HashMap::new(),
            failures: HashMap::new(),
            state: SyncState::Idle,
            finished_at: None,
            cooldown: Duration::milliseconds(i64::try_from(config.sync_cooldown_ms).unwrap_or(i64::MAX)),
            cancel: CancelToken::new(),
        }
    }

    pub fn session(&self) -> &BomSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BomSession {
        &mut self.session
    }

    pub fn into_session(self) -> BomSession {
        self.session
    }

    pub fn external(&self) -> &BomTree {
        &self.external
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn state(&self) -> SyncState {
        self.state_at(Utc::now())
    }

    /// State as observed at `now`; Success and Error read as Idle once the
    /// cool-down has elapsed.
    pub fn state_at(&self, now: DateTime<Utc>) -> SyncState {
        match (self.state, self.finished_at) {
            (SyncState::Success | SyncState::Error, Some(finished)) if now - finished >= self.cooldown => {
                SyncState::Idle
            }
            (state, _) => state,
        }
    }

    fn set_state(&mut self, to: SyncState) {
        let from = self.state();
        self.state = to;
        self.finished_at = match to {
            SyncState::Success | SyncState::Error => Some(Utc::now()),
            _ => None,
        };
        if from != to {
            self.session.push_event(BomEvent::SyncStateChanged { from, to });
        }
    }

    fn finish(&mut self, failed: bool) {
        self.set_state(if failed { SyncState::Error } else { SyncState::Success });
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Pulls a fresh snapshot and recomputes the diff set. Resolution flags
    /// and failures from the previous set are discarded.
    pub async fn refresh(&mut self) -> BomResult<usize> {
        self.set_state(SyncState::Syncing);
        let snapshot = match self.provider.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "ERP snapshot fetch failed");
                self.finish(true);
                return Err(BomError::snapshot_unavailable(e.to_string()));
            }
        };

        self.external = snapshot;
        self.session.recompute();
        self.diffs = self.diff_engine.diff(self.session.tree(), &self.external);
        self.resolutions.clear();
        self.failures.clear();
        tracing::info!(diffs = self.diffs.len(), "Reconciliation refreshed");
        self.finish(false);
        Ok(self.diffs.len())
    }

    fn record(&self, diff_id: Uuid) -> BomResult<&DiffRecord> {
        self.diffs
            .iter()
            .find(|d| d.id == diff_id)
            .ok_or(BomError::DiffNotFound { id: diff_id })
    }

    fn resolution(&self, diff_id: Uuid) -> Resolution {
        self.resolutions.get(&diff_id).copied().unwrap_or_default()
    }

    fn is_resolved(&self, diff_id: Uuid) -> bool {
        let resolution = self.resolution(diff_id);
        resolution.fixed || resolution.ignored
    }

    fn with_flags(&self, record: &DiffRecord) -> DiffRecord {
        let resolution = self.resolution(record.id);
        record.with_resolution(resolution.fixed, resolution.ignored)
    }

    /// Applies one fix without touching the sync state.
    fn apply(&mut self, diff_id: Uuid) -> BomResult<FixOutcome> {
        let record = self.record(diff_id)?.clone();
        if self.is_resolved(diff_id) {
            return Ok(FixOutcome::AlreadyResolved);
        }

        match self.session.apply_fix(&self.external, &record) {
            Ok(effect) => {
                self.resolutions.entry(diff_id).or_default().fixed = true;
                self.failures.remove(&diff_id);
                self.suggestions.record_outcome(record.diff_type, true);
                self.session.push_event(BomEvent::DiffFixed { diff_id, position: record.position.clone() });
                tracing::debug!(diff = %diff_id, position = %record.position, kind = %record.diff_type, "Diff fixed");
                Ok(FixOutcome::Fixed(effect))
            }
            Err(error) => {
                tracing::warn!(diff = %diff_id, position = %record.position, error = %error, "Fix failed");
                self.suggestions.record_outcome(record.diff_type, false);
                self.session.push_event(BomEvent::DiffFailed {
                    diff_id,
                    error_code: error.error_code().to_string(),
                });
                self.failures.insert(diff_id, error.clone());
                Err(error)
            }
        }
    }

    pub fn fix_one(&mut self, diff_id: Uuid) -> BomResult<FixOutcome> {
        self.record(diff_id)?;
        if self.is_resolved(diff_id) {
            return Ok(FixOutcome::AlreadyResolved);
        }
        self.set_state(SyncState::Syncing);
        let outcome = self.apply(diff_id);
        self.finish(outcome.is_err());
        outcome
    }

    /// Fixes records in the given order. A failing record is recorded and the
    /// batch moves on; cancellation is checked before each record.
    pub fn fix_many(&mut self, diff_ids: &[Uuid], progress: &mut dyn FnMut(&SyncProgress)) -> BatchResult {
        self.cancel.reset();
        self.set_state(SyncState::Syncing);
        let total = diff_ids.len();
        let mut result = BatchResult::default();
        tracing::info!(total, "Fix batch started");

        for (index, diff_id) in diff_ids.iter().copied().enumerate() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                tracing::info!(processed = index, total, "Fix batch cancelled");
                break;
            }

            let succeeded = match self.apply(diff_id) {
                Ok(FixOutcome::Fixed(_)) => {
                    result.fixed += 1;
                    true
                }
                Ok(FixOutcome::AlreadyResolved) => {
                    result.skipped += 1;
                    true
                }
                Err(error) => {
                    result.failed += 1;
                    result.failures.push(FixFailure { diff_id, error });
                    false
                }
            };

            let current = index + 1;
            progress(&SyncProgress {
                current,
                total,
                percent: current as f64 / total as f64 * 100.0,
                diff_id,
                succeeded,
            });
        }

        tracing::info!(
            fixed = result.fixed,
            failed = result.failed,
            skipped = result.skipped,
            cancelled = result.cancelled,
            "Fix batch finished"
        );
        self.finish(result.failed > 0);
        result
    }

    pub fn ignore(&mut self, diff_id: Uuid) -> BomResult<()> {
        self.record(diff_id)?;
        self.resolutions.entry(diff_id).or_default().ignored = true;
        self.session.push_event(BomEvent::DiffIgnored { diff_id });
        Ok(())
    }

    /// Ignores every listed record; unknown ids fail the call before any
    /// record is touched.
    pub fn ignore_many(&mut self, diff_ids: &[Uuid]) -> BomResult<usize> {
        for diff_id in diff_ids {
            self.record(*diff_id)?;
        }
        for diff_id in diff_ids {
            self.ignore(*diff_id)?;
        }
        Ok(diff_ids.len())
    }

    /// Fixes every unresolved High record in diff order, then refreshes
    /// unless the batch was cancelled.
    pub async fn one_click_sync(&mut self, progress: &mut (dyn FnMut(&SyncProgress) + Send)) -> OneClickReport {
        let targets: Vec<Uuid> = self
            .diffs
            .iter()
            .filter(|d| d.severity == Severity::High && !self.is_resolved(d.id))
            .map(|d| d.id)
            .collect();
        tracing::info!(targets = targets.len(), "One-click sync started");

        let batch = self.fix_many(&targets, progress);
        if batch.cancelled {
            return OneClickReport { batch, refreshed_diffs: None, refresh_error: None };
        }

        let batch_failed = batch.failed > 0;
        match self.refresh().await {
            Ok(count) => {
                if batch_failed {
                    self.finish(true);
                }
                OneClickReport { batch, refreshed_diffs: Some(count), refresh_error: None }
            }
            Err(error) => OneClickReport { batch, refreshed_diffs: None, refresh_error: Some(error) },
        }
    }

    /// Unresolved records, in diff order.
    pub fn active_diffs(&self) -> Vec<DiffRecord> {
        self.diffs
            .iter()
            .filter(|d| !self.is_resolved(d.id))
            .cloned()
            .collect()
    }

    /// Every record of the current set, carrying its resolution flags.
    pub fn all_diffs(&self) -> Vec<DiffRecord> {
        self.diffs.iter().map(|d| self.with_flags(d)).collect()
    }

    pub fn suggestions(&self) -> Vec<FixSuggestion> {
        let active = self.active_diffs();
        self.suggestions.suggest_all(&active, &self.external)
    }

    pub fn failure(&self, diff_id: Uuid) -> Option<&BomError> {
        self.failures.get(&diff_id)
    }
}
