//! BOM engine: arena tree, substitution state machine, cost rollup,
//! validation, ERP reconciliation and sync orchestration.

pub mod diff;
pub mod events;
pub mod fix;
pub mod position;
pub mod provider;
pub mod rollup;
pub mod session;
pub mod substitution;
pub mod suggestion;
pub mod sync;
pub mod tree;
pub mod validator;

pub use diff::{compliance_note, DiffEngine, COST_TOLERANCE};
pub use events::BomEvent;
pub use fix::{apply_fix, FixEffect};
pub use position::{alternate_anchor, alternate_letter, generate_position, ROOT_POSITION};
pub use provider::{CatalogProvider, SnapshotProvider, StaticCatalog, StaticSnapshotProvider};
pub use rollup::{group_contributions, rollup, GroupContribution, RollupStats};
pub use session::{BomSession, Views};
pub use substitution::{AlternateChoice, MemberState, StatusChange, Transition, TransitionKind};
pub use suggestion::{FixAction, FixSuggestion, PatternHistory, PatternStats, SuggestionEngine};
pub use sync::{BatchResult, CancelToken, FixFailure, FixOutcome, OneClickReport, SyncOrchestrator, SyncProgress, SyncState};
pub use tree::{BomTree, SubstituteGroup};
pub use validator::{validate, BomValidator, Issue, ValidationReport};

pub use bomsync_models::{
    BomError, BomNode, BomResult, DiffRecord, DiffType, FlatPart, ItemStatus, Level, Lifecycle, NodeId, NodeKind,
    PartAttributes, Severity,
};
