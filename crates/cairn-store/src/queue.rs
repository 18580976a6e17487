//! Blocking priority queue over agent IDs (spec §4.1).
//!
//! Ordering key is `(-priority, enqueued_at)` so higher priority and
//! earlier enqueue time both sort earlier. The queue itself has no
//! notion of concurrency slots — that lives in the Worker Pool.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use cairn_core::{AgentId, TaskPriority};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub agent_id: AgentId,
    pub priority: TaskPriority,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    fn sort_key(&self) -> (i32, DateTime<Utc>) {
        (-self.priority.as_i32(), self.enqueued_at)
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest sort_key out
        // first, so reverse the comparison.
        other.sort_key().cmp(&self.sort_key())
    }
}

pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    notify: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    pub async fn enqueue(&self, agent_id: AgentId, priority: TaskPriority) {
        let task = QueuedTask {
            agent_id,
            priority,
            enqueued_at: Utc::now(),
        };
        self.heap.lock().await.push(task);
        self.notify.notify_one();
    }

    pub async fn try_dequeue(&self) -> Option<QueuedTask> {
        self.heap.lock().await.pop()
    }

    pub async fn dequeue_wait(&self) -> QueuedTask {
        loop {
            if let Some(task) = self.try_dequeue().await {
                return task;
            }
            self.notify.notified().await;
        }
    }

    pub async fn size(&self) -> usize {
        self.heap.lock().await.len()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeue_respects_priority_then_fifo() {
        let q = PriorityQueue::new();
        q.enqueue("a".into(), TaskPriority::Low).await;
        q.enqueue("b".into(), TaskPriority::Urgent).await;
        q.enqueue("c".into(), TaskPriority::High).await;

        assert_eq!(q.dequeue_wait().await.agent_id, "b");
        assert_eq!(q.dequeue_wait().await.agent_id, "c");
        assert_eq!(q.dequeue_wait().await.agent_id, "a");
    }

    #[tokio::test]
    async fn try_dequeue_on_empty_returns_none_immediately() {
        let q = PriorityQueue::new();
        assert!(q.try_dequeue().await.is_none());
    }

    #[tokio::test]
    async fn dequeue_wait_blocks_until_enqueue() {
        let q = std::sync::Arc::new(PriorityQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.dequeue_wait().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.enqueue("late".into(), TaskPriority::Normal).await;

        let task = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("did not resolve in time")
            .unwrap();
        assert_eq!(task.agent_id, "late");
    }

    #[tokio::test]
    async fn size_reflects_pending_tasks() {
        let q = PriorityQueue::new();
        assert_eq!(q.size().await, 0);
        q.enqueue("a".into(), TaskPriority::Normal).await;
        q.enqueue("b".into(), TaskPriority::Normal).await;
        assert_eq!(q.size().await, 2);
        q.try_dequeue().await;
        assert_eq!(q.size().await, 1);
    }

    #[tokio::test]
    async fn same_priority_dequeues_in_fifo_order() {
        let q = PriorityQueue::new();
        q.enqueue("first".into(), TaskPriority::Normal).await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        q.enqueue("second".into(), TaskPriority::Normal).await;

        assert_eq!(q.dequeue_wait().await.agent_id, "first");
        assert_eq!(q.dequeue_wait().await.agent_id, "second");
    }
}
