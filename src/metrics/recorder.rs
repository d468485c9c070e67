//! Metrics recorder for lap timer transfers

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!("laplink_bytes_received_total", "Payload bytes downloaded");
    describe_counter!("laplink_bytes_sent_total", "Payload bytes uploaded");
    describe_counter!(
        "laplink_transfers_started_total",
        "Transfers started, by operation"
    );
    describe_counter!(
        "laplink_transfers_completed_total",
        "Transfers completed successfully, by operation"
    );
    describe_counter!(
        "laplink_transfers_failed_total",
        "Transfers that failed, by operation and reason"
    );
    describe_counter!(
        "laplink_malformed_events_total",
        "Control events missing a required field"
    );
    describe_histogram!(
        "laplink_transfer_duration_seconds",
        "Duration of a download or upload"
    );
}

/// Record a control event that could not be parsed
pub fn record_malformed_event() {
    counter!("laplink_malformed_events_total").increment(1);
}

fn record_transfer_started(operation: &'static str) {
    counter!("laplink_transfers_started_total", "operation" => operation).increment(1);
}

fn record_transfer_complete(operation: &'static str, duration: Duration, bytes: u64) {
    counter!("laplink_transfers_completed_total", "operation" => operation).increment(1);
    histogram!("laplink_transfer_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());

    if operation == "upload" {
        counter!("laplink_bytes_sent_total").increment(bytes);
    } else {
        counter!("laplink_bytes_received_total").increment(bytes);
    }
}

fn record_transfer_failed(operation: &'static str, reason: &'static str) {
    counter!("laplink_transfers_failed_total", "operation" => operation, "reason" => reason)
        .increment(1);
}

/// Times one transfer and records its outcome
pub struct TransferMetrics {
    operation: &'static str,
    start_time: Instant,
}

impl TransferMetrics {
    pub fn start(operation: &'static str) -> Self {
        record_transfer_started(operation);
        Self {
            operation,
            start_time: Instant::now(),
        }
    }

    pub fn complete(self, bytes: u64) {
        record_transfer_complete(self.operation, self.start_time.elapsed(), bytes);
    }

    pub fn fail(self, reason: &'static str) {
        record_transfer_failed(self.operation, reason);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
