#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod redis;

#[cfg(any(test, feature = "test-util"))]
pub use self::memory::MemoryQueue;
pub use self::redis::{RedisQueue, StreamMessage};

use crate::tasks::Task;
use crate::IndexerError;
use async_trait::async_trait;

/// Where child tasks go
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &Task) -> Result<(), IndexerError>;
}
