use lazy_static::lazy_static;
use prometheus::{HistogramVec, IntCounterVec, register_histogram_vec, register_int_counter_vec};

// Labels stay low-cardinality: chain names, fixed outcome strings, consumer names.
lazy_static! {
    /// Single adapter calls against a single endpoint, with outcome {ok, not_found, error, timeout}.
    pub static ref ENDPOINT_CALLS: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_endpoint_calls_total",
        "adapter calls against a single endpoint",
        &["chain", "outcome"],
    )
    .unwrap();

    /// Lookups that failed on every endpoint of a chain.
    pub static ref RESOLUTION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_resolution_failures_total",
        "transaction lookups that failed on every endpoint",
        &["chain"],
    )
    .unwrap();

    /// Signed messages that arrived without a hash and had none on record.
    pub static ref MISSING_HASH: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_missing_hash_total",
        "signed messages with no recoverable transaction hash",
        &["chain"],
    )
    .unwrap();

    pub static ref PROCESSED: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_processed_total",
        "processed transactions by direction and outcome",
        &["direction", "outcome"],
    )
    .unwrap();

    pub static ref PROCESSING_DURATION: HistogramVec = register_histogram_vec!(
        "tx_tracker_processing_duration_seconds",
        "time spent processing a single message",
        &["direction"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    /// Consumed events with outcome {done, failed, expired, skipped, invalid}.
    pub static ref CONSUMER_EVENTS: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_consumer_events_total",
        "queue events handled by a consumer",
        &["consumer", "outcome"],
    )
    .unwrap();

    /// Writes or reads that failed on the secondary store of a fan-out repository.
    pub static ref SECONDARY_STORE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "tx_tracker_secondary_store_errors_total",
        "failed operations on the secondary repository",
        &["operation"],
    )
    .unwrap();
}
