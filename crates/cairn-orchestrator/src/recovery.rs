//! Re-hydrate in-memory state from the lifecycle store at startup (spec
//! §4.10). The only path by which state previously persisted becomes
//! live again — there is no in-memory session that survives a crash
//! independently of the lifecycle store.

use std::sync::Arc;

use cairn_core::AgentState;
use cairn_store::{LifecycleStore, PriorityQueue};

/// An overlay backing's existence check, supplied by the caller so
/// Recovery stays independent of any one `ObjectStore` implementation.
#[async_trait::async_trait]
pub trait OverlayBackingProbe: Send + Sync {
    async fn exists(&self, overlay_location: &str) -> bool;
}

pub struct RecoveryReport {
    pub re_enqueued: Vec<String>,
    pub marked_errored: Vec<String>,
    pub left_in_place: Vec<String>,
}

/// Run recovery: for every active (non-terminal-for-listing) record,
/// check its overlay backing still exists; if not, mark it `errored`.
/// Only `queued` records are automatically re-enqueued — any other
/// non-terminal state is left as-is, since a lifecycle mid-transition
/// is not safely resumable without re-running side effects.
pub async fn recover(
    lifecycle_store: &LifecycleStore,
    queue: &PriorityQueue,
    probe: &dyn OverlayBackingProbe,
) -> cairn_core::Result<RecoveryReport> {
    let mut report = RecoveryReport {
        re_enqueued: Vec::new(),
        marked_errored: Vec::new(),
        left_in_place: Vec::new(),
    };

    for mut record in lifecycle_store.list_active() {
        if !probe.exists(&record.overlay_location).await {
            record.fail("overlay missing after restart");
            lifecycle_store.save(record.clone()).await?;
            report.marked_errored.push(record.agent_id);
            continue;
        }

        if record.state == AgentState::Queued {
            queue.enqueue(record.agent_id.clone(), record.priority).await;
            report.re_enqueued.push(record.agent_id);
        } else {
            report.left_in_place.push(record.agent_id);
        }
    }

    Ok(report)
}
