use bomsync_models::{ItemStatus, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncState;

/// Notifications queued by the session and the sync orchestrator. The
/// caller drains them; nothing is pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BomEvent {
    NodeAdded {
        node: NodeId,
        position: String,
    },
    NodeRemoved {
        position: String,
        /// Nodes removed, including cascaded alternates.
        count: usize,
    },
    StatusChanged {
        node: NodeId,
        from: ItemStatus,
        to: ItemStatus,
    },
    AlternateApplied {
        primary: Option<NodeId>,
        alternate: NodeId,
    },
    ViewsRecomputed {
        total_cost: f64,
        high_issues: usize,
    },
    DiffFixed {
        diff_id: Uuid,
        position: String,
    },
    DiffIgnored {
        diff_id: Uuid,
    },
    DiffFailed {
        diff_id: Uuid,
        error_code: String,
    },
    SyncStateChanged {
        from: SyncState,
        to: SyncState,
    },
}
