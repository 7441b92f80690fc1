//! Redis streams binding: one stream per queue, one consumer group.

use super::TaskQueue;
use crate::streams::{dead_letter_stream, queue_stream};
use crate::tasks::{Queue, Task};
use crate::IndexerError;
use async_trait::async_trait;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const TASK_FIELD: &str = "task";
pub const ATTEMPT_FIELD: &str = "attempt";

/// Redis message from a queue stream
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub queue: Queue,
    pub contents: HashMap<String, String>,
}

impl StreamMessage {
    pub fn task_json(&self) -> Option<&str> {
        self.contents.get(TASK_FIELD).map(String::as_str)
    }

    pub fn task(&self) -> Result<Task, IndexerError> {
        let json = self
            .task_json()
            .ok_or_else(|| IndexerError::Payload(format!("Missing {} field", TASK_FIELD)))?;
        Task::from_json(json)
    }

    /// Deliveries so far; a fresh task is attempt 0
    pub fn attempt(&self) -> u32 {
        self.contents
            .get(ATTEMPT_FIELD)
            .and_then(|a| a.parse().ok())
            .unwrap_or(0)
    }
}

/// Producer and consumer over the queue streams
/// Uses connection pooling for production scalability
#[derive(Clone)]
pub struct RedisQueue {
    manager: redis::aio::ConnectionManager,
    pub prefix: String,
    pub group: String,
    pub consumer: String,
}

impl RedisQueue {
    pub async fn new(
        redis_url: &str,
        prefix: String,
        group: String,
        consumer: String,
    ) -> Result<Self, IndexerError> {
        let client = redis::Client::open(redis_url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            prefix,
            group,
            consumer,
        })
    }

    pub fn stream(&self, queue: Queue) -> String {
        queue_stream(&self.prefix, queue.name())
    }

    /// Ensure the consumer group exists on every stream, create it if not
    pub async fn ensure_consumer_groups(
        &self,
        queues: impl IntoIterator<Item = Queue>,
    ) -> Result<(), IndexerError> {
        let mut conn = self.manager.clone();

        for queue in queues {
            let stream = self.stream(queue);
            // XGROUP CREATE stream group id [MKSTREAM]
            let result: Result<String, redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(
                    "Created consumer group '{}' for stream '{}'",
                    self.group, stream
                ),
                Err(e) if e.to_string().contains("BUSYGROUP") => debug!(
                    "Consumer group '{}' already exists for stream '{}'",
                    self.group, stream
                ),
                Err(e) => return Err(IndexerError::Queue(e)),
            }
        }

        Ok(())
    }

    /// Read messages from one queue without blocking
    /// cursor: "0" for pending messages, ">" for new messages
    pub async fn read_messages(
        &self,
        queue: Queue,
        cursor: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>, IndexerError> {
        let mut conn = self.manager.clone();
        let stream = self.stream(queue);

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count);

        let reply: StreamReadReply = conn.xread_options(&[&stream], &[cursor], &opts).await?;

        let messages = reply
            .keys
            .into_iter()
            .flat_map(|stream_key| {
                stream_key
                    .ids
                    .into_iter()
                    .map(move |stream_id| stream_message(queue, stream_id))
            })
            .collect();

        Ok(messages)
    }

    /// Take over entries another consumer has left pending for at least
    /// `min_idle`, so a crashed worker's deliveries are not stranded
    pub async fn claim_idle(
        &self,
        queue: Queue,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, IndexerError> {
        let mut conn = self.manager.clone();
        let stream = self.stream(queue);
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);

        // XAUTOCLAIM stream group consumer min-idle-time start COUNT count
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &stream,
                &self.group,
                &self.consumer,
                min_idle_ms,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        if !reply.deleted_ids.is_empty() {
            debug!(
                "{} pending entries of {} were already deleted",
                reply.deleted_ids.len(),
                stream
            );
        }

        Ok(reply
            .claimed
            .into_iter()
            .map(|stream_id| stream_message(queue, stream_id))
            .collect())
    }

    /// Add a task entry to its queue stream
    pub async fn add(&self, task: &Task, attempt: u32) -> Result<String, IndexerError> {
        let mut conn = self.manager.clone();
        let json = task.to_json()?;
        let id: String = conn
            .xadd(
                self.stream(task.queue()),
                "*",
                &[(TASK_FIELD, json), (ATTEMPT_FIELD, attempt.to_string())],
            )
            .await?;
        Ok(id)
    }

    /// Acknowledge a message and optionally delete it from the stream
    pub async fn ack_message(
        &self,
        message: &StreamMessage,
        delete: bool,
    ) -> Result<(), IndexerError> {
        let mut conn = self.manager.clone();
        let stream = self.stream(message.queue);

        // XACK stream group id
        let _: u64 = conn.xack(&stream, &self.group, &[&message.id]).await?;

        if delete {
            // XDEL stream id
            let _: u64 = conn.xdel(&stream, &[&message.id]).await?;
        }

        Ok(())
    }

    /// Park a message on the dead-letter stream with the error that ended it
    pub async fn dead_letter(
        &self,
        message: &StreamMessage,
        error: &str,
    ) -> Result<(), IndexerError> {
        let mut conn = self.manager.clone();
        let task = message.task_json().unwrap_or_default().to_string();

        let _: String = conn
            .xadd(
                dead_letter_stream(&self.prefix),
                "*",
                &[
                    ("queue", message.queue.name().to_string()),
                    ("message_id", message.id.clone()),
                    (TASK_FIELD, task),
                    (ATTEMPT_FIELD, message.attempt().to_string()),
                    ("error", error.to_string()),
                    ("failed_at", chrono::Utc::now().to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    /// Get pending messages count
    pub async fn pending_count(&self, queue: Queue) -> Result<usize, IndexerError> {
        let mut conn = self.manager.clone();

        // XPENDING stream group
        let result: redis::Value = redis::cmd("XPENDING")
            .arg(self.stream(queue))
            .arg(&self.group)
            .query_async(&mut conn)
            .await?;

        // The result is an array: [count, start_id, end_id, consumers]
        if let redis::Value::Array(arr) = result {
            if let Some(redis::Value::Int(count)) = arr.first() {
                return Ok(*count as usize);
            }
        }

        Ok(0)
    }

    /// Entries waiting in a queue stream
    pub async fn stream_len(&self, queue: Queue) -> Result<usize, IndexerError> {
        let mut conn = self.manager.clone();
        let len: usize = conn.xlen(self.stream(queue)).await?;
        Ok(len)
    }
}

fn stream_message(queue: Queue, stream_id: StreamId) -> StreamMessage {
    let contents = stream_id
        .map
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                redis::Value::BulkString(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                redis::Value::SimpleString(s) => s,
                other => format!("{:?}", other),
            };
            (k, value)
        })
        .collect();

    StreamMessage {
        id: stream_id.id,
        queue,
        contents,
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), IndexerError> {
        self.add(task, 0).await.map_err(|e| match e {
            IndexerError::Queue(e) => {
                IndexerError::Enqueue(format!("XADD to {} failed: {}", task.queue(), e))
            }
            other => other,
        })?;
        Ok(())
    }
}
