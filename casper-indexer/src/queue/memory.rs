use super::TaskQueue;
use crate::tasks::{Task, TaskKind};
use crate::IndexerError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// In-process FIFO queue with a switch to simulate an unreachable broker
#[derive(Default)]
pub struct MemoryQueue {
    tasks: Mutex<VecDeque<Task>>,
    // remaining enqueues before failing, None = never fail
    fail_after: Mutex<Option<usize>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` more tasks, then fail every enqueue
    pub fn fail_after(&self, n: usize) {
        if let Ok(mut fail_after) = self.fail_after.lock() {
            *fail_after = Some(n);
        }
    }

    pub fn fail_all(&self) {
        self.fail_after(0);
    }

    pub fn heal(&self) {
        if let Ok(mut fail_after) = self.fail_after.lock() {
            *fail_after = None;
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pop(&self) -> Option<Task> {
        self.tasks.lock().ok().and_then(|mut t| t.pop_front())
    }

    /// Snapshot of the queued tasks in order
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|mut t| t.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: TaskKind) -> usize {
        self.tasks().iter().filter(|t| t.kind() == kind).count()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), IndexerError> {
        let mut fail_after = self
            .fail_after
            .lock()
            .map_err(|_| IndexerError::Enqueue("memory queue poisoned".to_string()))?;
        match fail_after.as_mut() {
            Some(0) => {
                return Err(IndexerError::Enqueue(format!(
                    "queue {} unavailable",
                    task.queue()
                )))
            }
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        drop(fail_after);

        self.tasks
            .lock()
            .map_err(|_| IndexerError::Enqueue("memory queue poisoned".to_string()))?
            .push_back(task.clone());
        Ok(())
    }
}
