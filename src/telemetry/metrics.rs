//! Metric instruments for notification delivery.
//!
//! Created from the globally registered `MeterProvider`; without OTLP
//! export they are no-ops.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter(super::SERVICE_NAME)
}

/// Counter: records whose notification state was committed.
/// Labels: `workflow`.
pub fn records_notified() -> Counter<u64> {
    meter()
        .u64_counter("notify.records.notified")
        .with_description("Assignments notified and committed")
        .build()
}

/// Counter: recipient buckets whose message did not go out.
/// Labels: `workflow`.
pub fn buckets_failed() -> Counter<u64> {
    meter()
        .u64_counter("notify.buckets.failed")
        .with_description("Recipient messages that failed delivery")
        .build()
}

/// Counter: chunks accepted by the transport.
pub fn chunks_sent() -> Counter<u64> {
    meter()
        .u64_counter("notify.chunks.sent")
        .with_description("Message chunks delivered")
        .build()
}
