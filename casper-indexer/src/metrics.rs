use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

lazy_static! {
    /// Tasks handled successfully, by task kind
    pub static ref TASKS_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "casper_indexer_tasks_processed_total",
        "Total number of tasks handled successfully",
        &["kind"]
    )
    .unwrap();

    /// Task invocations that returned an error, by task kind
    pub static ref TASKS_FAILED: IntCounterVec = register_int_counter_vec!(
        "casper_indexer_tasks_failed_total",
        "Total number of task invocations that failed",
        &["kind"]
    )
    .unwrap();

    /// Failed tasks put back on their queue
    pub static ref TASKS_RETRIED: IntCounterVec = register_int_counter_vec!(
        "casper_indexer_tasks_retried_total",
        "Total number of failed tasks re-enqueued for another attempt",
        &["kind"]
    )
    .unwrap();

    /// Tasks sent to the dead-letter stream
    pub static ref TASKS_DEAD_LETTERED: IntCounterVec = register_int_counter_vec!(
        "casper_indexer_tasks_dead_lettered_total",
        "Total number of tasks sent to the dead-letter stream",
        &["kind"]
    )
    .unwrap();

    /// Child tasks enqueued by fan-out
    pub static ref TASKS_ENQUEUED: IntCounterVec = register_int_counter_vec!(
        "casper_indexer_tasks_enqueued_total",
        "Total number of child tasks enqueued",
        &["kind"]
    )
    .unwrap();

    pub static ref TASKS_ACTIVE: IntGauge = register_int_gauge!(
        "casper_indexer_tasks_active",
        "Current number of tasks being handled"
    )
    .unwrap();

    /// Delivered but unacknowledged messages, by queue
    pub static ref QUEUE_PENDING: IntGaugeVec = register_int_gauge_vec!(
        "casper_indexer_queue_pending",
        "Current number of pending messages per queue",
        &["queue"]
    )
    .unwrap();

    pub static ref BLOCKS_VERIFIED: IntCounter = register_int_counter!(
        "casper_indexer_blocks_verified_total",
        "Total number of blocks marked verified"
    )
    .unwrap();

    /// Placeholder rows written because a deploy info could not be fetched
    pub static ref DEPLOY_INFO_FALLBACKS: IntCounter = register_int_counter!(
        "casper_indexer_deploy_info_fallbacks_total",
        "Total number of deploy info placeholder rows written"
    )
    .unwrap();
}

/// Register every metric so the first scrape already lists them
pub fn initialize_metrics() {
    lazy_static::initialize(&TASKS_PROCESSED);
    lazy_static::initialize(&TASKS_FAILED);
    lazy_static::initialize(&TASKS_RETRIED);
    lazy_static::initialize(&TASKS_DEAD_LETTERED);
    lazy_static::initialize(&TASKS_ENQUEUED);
    lazy_static::initialize(&TASKS_ACTIVE);
    lazy_static::initialize(&QUEUE_PENDING);
    lazy_static::initialize(&BLOCKS_VERIFIED);
    lazy_static::initialize(&DEPLOY_INFO_FALLBACKS);
}

/// Encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        TASKS_PROCESSED.with_label_values(&["block:raw"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("casper_indexer_tasks_processed_total"));
    }
}
