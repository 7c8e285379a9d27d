//! Structured delivery diagnostics.
//!
//! Workflows report every delivery outcome as a [`DeliveryEvent`] to an
//! injectable [`DiagnosticSink`]. Production runs log them through
//! `tracing`; tests collect them with [`RecordingSink`] and assert on the
//! failure reasons directly.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::model::{AssignmentId, RecipientId};

/// Which workflow produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    NewAssignment,
    DeadlineChange,
    Reminder,
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Workflow::NewAssignment => "new_assignment",
            Workflow::DeadlineChange => "deadline_change",
            Workflow::Reminder => "reminder",
        };
        write!(f, "{s}")
    }
}

/// Why a single chunk was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// No bot token configured.
    MissingCredentials,
    /// Empty recipient address.
    MissingRecipient,
    /// The API answered with a non-2xx status.
    Rejected { status: u16, body: String },
    /// Connection error, timeout or unreadable response.
    Network { message: String },
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryFailure::MissingCredentials => write!(f, "bot token is not configured"),
            DeliveryFailure::MissingRecipient => write!(f, "recipient is empty"),
            DeliveryFailure::Rejected { status, body } => write!(f, "HTTP {status}: {body}"),
            DeliveryFailure::Network { message } => write!(f, "network error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// Executor has no linked recipient; the record was skipped.
    RecipientMissing {
        workflow: Workflow,
        assignment: AssignmentId,
    },
    /// One chunk failed. Earlier chunks of the same message stay delivered.
    ChunkFailed {
        recipient: RecipientId,
        chunk_index: usize,
        chunk_count: usize,
        reason: DeliveryFailure,
    },
    BucketDelivered {
        workflow: Workflow,
        recipient: RecipientId,
        records: usize,
        chunks: usize,
    },
    /// Nothing was committed for this bucket.
    BucketFailed {
        workflow: Workflow,
        recipient: RecipientId,
        records: usize,
    },
}

/// Receiver for delivery diagnostics.
pub trait DiagnosticSink {
    fn record(&self, event: DeliveryEvent);
}

/// Default sink: emits each event as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::RecipientMissing {
                workflow,
                assignment,
            } => {
                tracing::debug!(%workflow, %assignment, "executor has no linked recipient");
            }
            DeliveryEvent::ChunkFailed {
                recipient,
                chunk_index,
                chunk_count,
                reason,
            } => {
                tracing::warn!(
                    %recipient,
                    chunk = chunk_index + 1,
                    chunks = chunk_count,
                    %reason,
                    "chunk delivery failed"
                );
            }
            DeliveryEvent::BucketDelivered {
                workflow,
                recipient,
                records,
                chunks,
            } => {
                tracing::info!(%workflow, %recipient, records, chunks, "notification delivered");
            }
            DeliveryEvent::BucketFailed {
                workflow,
                recipient,
                records,
            } => {
                tracing::warn!(%workflow, %recipient, records, "notification not delivered");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reasons of all failed chunks, in order.
    pub fn failures(&self) -> Vec<DeliveryFailure> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeliveryEvent::ChunkFailed { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: DeliveryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn record(&self, event: DeliveryEvent) {
        (**self).record(event);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for std::sync::Arc<S> {
    fn record(&self, event: DeliveryEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tags() {
        let event = DeliveryEvent::ChunkFailed {
            recipient: RecipientId::new("100"),
            chunk_index: 1,
            chunk_count: 3,
            reason: DeliveryFailure::Rejected {
                status: 403,
                body: "Forbidden".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk_failed");
        assert_eq!(json["reason"]["kind"], "rejected");
        assert_eq!(json["reason"]["status"], 403);

        let back: DeliveryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn recording_sink_through_shared_handle() {
        let sink = std::sync::Arc::new(RecordingSink::new());
        let handle = sink.clone();
        handle.record(DeliveryEvent::RecipientMissing {
            workflow: Workflow::Reminder,
            assignment: AssignmentId(3),
        });
        handle.record(DeliveryEvent::ChunkFailed {
            recipient: RecipientId::new("7"),
            chunk_index: 0,
            chunk_count: 1,
            reason: DeliveryFailure::MissingCredentials,
        });

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.failures(), vec![DeliveryFailure::MissingCredentials]);
    }
}
