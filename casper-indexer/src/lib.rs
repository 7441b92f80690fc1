pub mod chain;
#[cfg(test)]
mod fixtures;
pub mod fanout;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod parsing;
pub mod queue;
pub mod store;
pub mod tasks;
pub mod value;
pub mod worker;

use thiserror::Error;

/// Error types for the indexer
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The node is unreachable or has nothing for the requested key yet
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The payload arrived but a required field is not in the expected form
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persist error: {message}")]
    Persist { message: String, transient: bool },

    /// A child task could not be handed to the queue during fan-out
    #[error("Enqueue error: {0}")]
    Enqueue(String),

    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    /// A task message could not be decoded
    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    pub fn persist(message: impl Into<String>) -> Self {
        IndexerError::Persist {
            message: message.into(),
            transient: true,
        }
    }

    /// Whether redelivering the same task can succeed without a code or schema fix.
    ///
    /// Parse and payload errors reproduce from the same bytes, and SQLSTATE
    /// class 42 (undefined table/column, syntax) means the schema is wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexerError::Fetch(_)
            | IndexerError::Enqueue(_)
            | IndexerError::Queue(_)
            | IndexerError::Cancelled
            | IndexerError::Other(_) => true,
            IndexerError::Persist { transient, .. } => *transient,
            IndexerError::Parse(_) | IndexerError::Payload(_) | IndexerError::Config(_) => false,
        }
    }
}

impl From<tokio_postgres::Error> for IndexerError {
    fn from(err: tokio_postgres::Error) -> Self {
        let transient = err
            .code()
            .map_or(true, |state| !state.code().starts_with("42"));
        IndexerError::Persist {
            message: err.to_string(),
            transient,
        }
    }
}

impl From<deadpool_postgres::PoolError> for IndexerError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        IndexerError::persist(err.to_string())
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        IndexerError::Fetch(err.to_string())
    }
}

/// Redis stream naming
pub mod streams {
    pub const DEFAULT_PREFIX: &str = "casper";
    pub const DEFAULT_GROUP: &str = "casper_indexer";
    pub const DEAD_LETTER: &str = "dead";

    pub fn queue_stream(prefix: &str, queue: &str) -> String {
        format!("{}:{}", prefix, queue)
    }

    pub fn dead_letter_stream(prefix: &str) -> String {
        format!("{}:{}", prefix, DEAD_LETTER)
    }
}

/// Configuration for the worker
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub redis_url: String,
    pub database_url: String,
    pub rpc_url: String,
    pub stream_prefix: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub concurrency: usize,
    pub priorities: tasks::QueuePriorities,
    pub max_retries: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub verify_interval_secs: u64,
    pub verify_batch: i64,
    /// Unverified blocks checked more recently than this are skipped by the sweeper
    pub verify_recheck_secs: u64,
    /// Pending entries idle this long are taken over from their consumer
    pub claim_min_idle_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost/casper".to_string(),
            rpc_url: "http://localhost:7777/rpc".to_string(),
            stream_prefix: streams::DEFAULT_PREFIX.to_string(),
            consumer_group: streams::DEFAULT_GROUP.to_string(),
            consumer_name: "indexer_1".to_string(),
            concurrency: 20,
            priorities: tasks::QueuePriorities::default(),
            max_retries: 25,
            retry_initial_backoff_ms: 1000,
            retry_max_backoff_ms: 60_000,
            verify_interval_secs: 60,
            verify_batch: 500,
            verify_recheck_secs: 600,
            claim_min_idle_ms: 300_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(IndexerError::Fetch("height not found".into()).is_retryable());
        assert!(IndexerError::Enqueue("connection refused".into()).is_retryable());
        assert!(IndexerError::persist("pool timeout").is_retryable());
        assert!(!IndexerError::Parse("gas".into()).is_retryable());
        assert!(!IndexerError::Payload("missing task".into()).is_retryable());
        assert!(!IndexerError::Persist {
            message: "relation \"blocks\" does not exist".into(),
            transient: false,
        }
        .is_retryable());
    }

    #[test]
    fn test_stream_names() {
        assert_eq!(streams::queue_stream("casper", "blocks"), "casper:blocks");
        assert_eq!(streams::dead_letter_stream("casper"), "casper:dead");
    }
}
