//! Span helpers for workflow runs.

use tracing::Span;

use crate::event::Workflow;
use crate::model::AssignmentId;

/// Span covering one workflow invocation.
///
/// `notify.records` is filled in with the success count when the run ends.
pub fn start_workflow_span(workflow: Workflow) -> Span {
    tracing::info_span!(
        "notify.workflow",
        "notify.workflow" = %workflow,
        "notify.records" = tracing::field::Empty,
    )
}

/// Record a committed notification-state update in the current span.
pub fn record_commit(id: AssignmentId, workflow: Workflow) {
    tracing::debug!(assignment = %id, %workflow, "notification state committed");
}
