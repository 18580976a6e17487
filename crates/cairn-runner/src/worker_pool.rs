//! Concurrency-gated dispatcher pulling from the queue, invoking the
//! Lifecycle Runner (spec §4.7). A single background task loops on
//! `queue.dequeue_wait()`, acquires a semaphore permit, and spawns the
//! lifecycle run concurrently; releasing the permit never blocks another
//! agent's dispatch.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use cairn_core::{AgentId, LifecycleRecord, Result};
use cairn_store::{LifecycleStore, PriorityQueue};

use crate::lifecycle_runner::{AgentContext, LifecycleRunner};

/// Resolves an `agent_id` dequeued from the [`PriorityQueue`] into the
/// runtime handles a lifecycle run needs. The Orchestrator owns overlay
/// lifetimes, so the pool asks it for a context rather than holding one
/// itself.
#[async_trait::async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve(&self, agent_id: &AgentId) -> Result<Arc<AgentContext>>;
}

pub struct WorkerPool {
    queue: Arc<PriorityQueue>,
    lifecycle_store: Arc<LifecycleStore>,
    runner: Arc<LifecycleRunner>,
    resolver: Arc<dyn ContextResolver>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<PriorityQueue>,
        lifecycle_store: Arc<LifecycleStore>,
        runner: Arc<LifecycleRunner>,
        resolver: Arc<dyn ContextResolver>,
        max_concurrent_agents: u32,
    ) -> Self {
        Self {
            queue,
            lifecycle_store,
            runner,
            resolver,
            semaphore: Arc::new(Semaphore::new(max_concurrent_agents as usize)),
        }
    }

    /// Spawn the dispatch loop. Runs until the process shuts down; each
    /// in-flight lifecycle continues to completion even after the loop
    /// itself would stop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let task = self.queue.dequeue_wait().await;
                let permit = self
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                let pool = self.clone();
                tokio::spawn(async move {
                    pool.dispatch(task.agent_id).await;
                    drop(permit);
                });
            }
        })
    }

    async fn dispatch(&self, agent_id: AgentId) {
        let record = match self.lifecycle_store.load(&agent_id) {
            Some(r) => r,
            None => {
                tracing::warn!(%agent_id, "dequeued agent has no lifecycle record, dropping");
                return;
            }
        };

        let context = match self.resolver.resolve(&agent_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(%agent_id, error = %e, "failed to resolve agent context");
                let mut record = record;
                record.fail(e.to_string());
                if let Err(save_err) = self.lifecycle_store.save(record).await {
                    tracing::error!(%agent_id, error = %save_err, "failed to persist errored record");
                }
                return;
            }
        };

        match self.runner.run(record, context).await {
            Ok(final_record) => {
                tracing::info!(%agent_id, state = %final_record.state, "lifecycle run finished");
            }
            Err(e) => {
                tracing::error!(%agent_id, error = %e, "lifecycle run failed to persist its own error");
            }
        }
    }
}
