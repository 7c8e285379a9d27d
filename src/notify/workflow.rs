//! The three notification workflows.
//!
//! All of them run the same pipeline: filter eligible records, group by
//! recipient, and for each bucket sort, render, split and send. State is
//! committed for a bucket only when every chunk of its message went out.
//! A failed bucket leaves its records untouched and does not stop the
//! remaining buckets. There is no retry; a later run re-evaluates
//! eligibility from the persisted state.

use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use opentelemetry::KeyValue;
use tracing::Instrument as _;

use super::format::{Formatter, render_deadline_change, render_deadline_note};
use super::{DIVIDER, REMINDER_HORIZON_DAYS, deliver, group_by_recipient};
use crate::error::Result;
use crate::event::{DeliveryEvent, DiagnosticSink, TracingSink, Workflow};
use crate::model::{AssignmentRecord, Status, Urgency};
use crate::notify::transport::Transport;
use crate::telemetry::{delivery, metrics};

/// Persists the notification-state fields (and status) of one record.
pub trait StateStore {
    fn save_notification_state(&mut self, record: &AssignmentRecord) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for &mut S {
    fn save_notification_state(&mut self, record: &AssignmentRecord) -> Result<()> {
        (**self).save_notification_state(record)
    }
}

/// Runs workflows against a transport and reports to a diagnostics sink.
pub struct Notifier<T, S = TracingSink> {
    transport: T,
    sink: S,
    organization: String,
    fixed_now: Option<NaiveDateTime>,
}

impl<T: Transport> Notifier<T> {
    pub fn new(transport: T, organization: impl Into<String>) -> Self {
        Self {
            transport,
            sink: TracingSink,
            organization: organization.into(),
            fixed_now: None,
        }
    }
}

impl<T: Transport, S: DiagnosticSink> Notifier<T, S> {
    pub fn with_sink<S2: DiagnosticSink>(self, sink: S2) -> Notifier<T, S2> {
        Notifier {
            transport: self.transport,
            sink,
            organization: self.organization,
            fixed_now: self.fixed_now,
        }
    }

    /// Pin the clock used for "today" and the header timestamp. Unpinned,
    /// both come from UTC.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn now(&self) -> NaiveDateTime {
        self.fixed_now.unwrap_or_else(|| Utc::now().naive_utc())
    }

    // -----------------------------------------------------------------------
    // New assignments
    // -----------------------------------------------------------------------

    /// Announce assignments whose creation notice has not gone out yet.
    ///
    /// On delivery: `notified_created = true`, `last_notified_deadline =
    /// deadline`, status becomes IN_PROGRESS.
    pub async fn notify_new<St>(
        &self,
        records: &mut [AssignmentRecord],
        store: &mut St,
    ) -> Result<usize>
    where
        St: StateStore + ?Sized,
    {
        let now = self.now();
        let formatter = Formatter::new(&self.organization, now);
        let today = now.date();

        self.run(
            Workflow::NewAssignment,
            records,
            store,
            |r| !r.notified_created,
            |bucket| compose_new(&formatter, today, bucket),
            |r| {
                r.notified_created = true;
                r.last_notified_deadline = Some(r.deadline);
                r.status = Status::InProgress;
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Deadline changes
    // -----------------------------------------------------------------------

    /// Announce deadlines that moved since the last creation/change notice.
    ///
    /// On delivery: `last_notified_deadline = deadline`.
    pub async fn notify_deadline_changes<St>(
        &self,
        records: &mut [AssignmentRecord],
        store: &mut St,
    ) -> Result<usize>
    where
        St: StateStore + ?Sized,
    {
        let now = self.now();
        let formatter = Formatter::new(&self.organization, now);
        let today = now.date();

        self.run(
            Workflow::DeadlineChange,
            records,
            store,
            |r| r.notified_created && r.last_notified_deadline.is_some_and(|d| d != r.deadline),
            |bucket| compose_deadline_change(&formatter, today, bucket),
            |r| r.last_notified_deadline = Some(r.deadline),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Reminders
    // -----------------------------------------------------------------------

    /// Remind about open assignments due within the reminder horizon
    /// (including expired ones) that were not reminded for this deadline.
    ///
    /// On delivery: `last_reminded_deadline = deadline`.
    pub async fn send_reminders<St>(
        &self,
        records: &mut [AssignmentRecord],
        store: &mut St,
    ) -> Result<usize>
    where
        St: StateStore + ?Sized,
    {
        let now = self.now();
        let formatter = Formatter::new(&self.organization, now);
        let today = now.date();
        let horizon = reminder_horizon(today);

        self.run(
            Workflow::Reminder,
            records,
            store,
            |r| {
                r.status.is_open()
                    && r.notified_created
                    && r.deadline <= horizon
                    && r.last_reminded_deadline != Some(r.deadline)
            },
            |bucket| compose_reminder(&formatter, today, bucket),
            |r| r.last_reminded_deadline = Some(r.deadline),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Shared pipeline
    // -----------------------------------------------------------------------

    async fn run<St, E, C, U>(
        &self,
        workflow: Workflow,
        records: &mut [AssignmentRecord],
        store: &mut St,
        eligible: E,
        compose: C,
        update: U,
    ) -> Result<usize>
    where
        St: StateStore + ?Sized,
        E: Fn(&AssignmentRecord) -> bool,
        C: Fn(&mut [&mut AssignmentRecord]) -> Vec<String>,
        U: Fn(&mut AssignmentRecord),
    {
        let span = delivery::start_workflow_span(workflow);

        async {
            let mut selected = Vec::new();
            for record in records.iter_mut().filter(|r| eligible(r)) {
                if record.executor.recipient.is_none() {
                    self.sink.record(DeliveryEvent::RecipientMissing {
                        workflow,
                        assignment: record.id,
                    });
                    continue;
                }
                selected.push(record);
            }

            let labels = [KeyValue::new("workflow", workflow.to_string())];
            let mut notified = 0usize;

            for mut bucket in group_by_recipient(selected) {
                let text = compose(&mut bucket.records).join("\n");
                let size = bucket.records.len();

                if !deliver(&self.transport, &bucket.recipient, &text, &self.sink).await {
                    self.sink.record(DeliveryEvent::BucketFailed {
                        workflow,
                        recipient: bucket.recipient,
                        records: size,
                    });
                    metrics::buckets_failed().add(1, &labels);
                    continue;
                }

                for record in bucket.records.iter_mut() {
                    // the caller's copy changes only once the store accepted it
                    let mut next = (**record).clone();
                    update(&mut next);
                    store.save_notification_state(&next)?;
                    **record = next;
                    delivery::record_commit(record.id, workflow);
                }
                notified += size;
                metrics::records_notified().add(size as u64, &labels);

                self.sink.record(DeliveryEvent::BucketDelivered {
                    workflow,
                    recipient: bucket.recipient,
                    records: size,
                    chunks: super::split_message(&text, super::MAX_MESSAGE_LEN).len(),
                });
            }

            tracing::Span::current().record("notify.records", notified);
            Ok::<_, crate::error::Error>(notified)
        }
        .instrument(span)
        .await
    }
}

/// Last deadline that still gets a reminder on `today`.
pub fn reminder_horizon(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_days(Days::new(REMINDER_HORIZON_DAYS as u64))
        .unwrap_or(NaiveDate::MAX)
}

// ---------------------------------------------------------------------------
// Message composition
// ---------------------------------------------------------------------------

fn sort_by_controller(bucket: &mut [&mut AssignmentRecord]) {
    bucket.sort_by_key(|r| (r.controller_key(), r.deadline));
}

fn compose_new(
    formatter: &Formatter,
    today: NaiveDate,
    bucket: &mut [&mut AssignmentRecord],
) -> Vec<String> {
    sort_by_controller(bucket);
    let total = bucket.len();

    let mut lines = formatter.render_header(
        "УВЕДОМЛЕНИЕ О НАЗНАЧЕНИИ ПОРУЧЕНИЙ",
        "📨",
        &bucket[0].executor,
    );
    lines.push(format!("Назначено поручений:  <b>{total}</b>"));

    for (i, record) in bucket.iter().enumerate() {
        lines.extend([String::new(), DIVIDER.to_string()]);
        lines.extend(formatter.render_card(record, i + 1, total));
        lines.extend([String::new(), render_deadline_note(record.days_left(today))]);
    }

    lines.push(String::new());
    lines.extend(formatter.render_footer("Просим приступить к исполнению в установленные сроки."));
    lines
}

fn compose_deadline_change(
    formatter: &Formatter,
    today: NaiveDate,
    bucket: &mut [&mut AssignmentRecord],
) -> Vec<String> {
    sort_by_controller(bucket);
    let total = bucket.len();

    let mut lines = formatter.render_header(
        "УВЕДОМЛЕНИЕ ОБ ИЗМЕНЕНИИ СРОКОВ ИСПОЛНЕНИЯ",
        "📋",
        &bucket[0].executor,
    );
    lines.push(format!("Количество изменений:  <b>{total}</b>"));

    for (i, record) in bucket.iter().enumerate() {
        lines.extend([String::new(), DIVIDER.to_string()]);
        lines.extend(formatter.render_card(record, i + 1, total));
        lines.push(String::new());
        // eligibility guarantees a previous deadline
        if let Some(old) = record.last_notified_deadline {
            lines.extend(render_deadline_change(old, record.deadline));
        }
        lines.extend([String::new(), render_deadline_note(record.days_left(today))]);
    }

    lines.push(String::new());
    lines.extend(formatter.render_footer("Просим учесть изменения при планировании работы."));
    lines
}

fn compose_reminder(
    formatter: &Formatter,
    today: NaiveDate,
    bucket: &mut [&mut AssignmentRecord],
) -> Vec<String> {
    bucket.sort_by_key(|r| {
        (
            Urgency::from_days_left(r.days_left(today)),
            r.controller_key(),
            r.deadline,
        )
    });
    let total = bucket.len();
    let count = |u: Urgency| {
        bucket
            .iter()
            .filter(|r| Urgency::from_days_left(r.days_left(today)) == u)
            .count()
    };

    let mut lines = formatter.render_header(
        "НАПОМИНАНИЕ О СРОКАХ ИСПОЛНЕНИЯ ПОРУЧЕНИЙ",
        "🗓",
        &bucket[0].executor,
    );

    lines.push("<b>Сводная информация:</b>".to_string());
    for urgency in Urgency::ALL {
        let n = count(urgency);
        if n > 0 {
            lines.push(format!("  · {} — <b>{n}</b>", urgency.summary_label()));
        }
    }

    let mut current = None;
    for (i, record) in bucket.iter().enumerate() {
        let days_left = record.days_left(today);
        let urgency = Urgency::from_days_left(days_left);
        if current != Some(urgency) {
            lines.extend([
                String::new(),
                DIVIDER.to_string(),
                format!("<b>{}</b>", urgency.section_title().to_uppercase()),
            ]);
            current = Some(urgency);
        }
        lines.push(String::new());
        lines.extend(formatter.render_card(record, i + 1, total));
        lines.extend([String::new(), render_deadline_note(days_left)]);
    }

    lines.push(String::new());
    let note = if count(Urgency::Expired) > 0 {
        "По поручениям с истёкшим сроком просим проинформировать контролирующего о ходе исполнения."
    } else {
        "Просим принять меры для исполнения поручений в установленные сроки."
    };
    lines.extend(formatter.render_footer(note));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeliveryFailure;
    use crate::model::RecipientId;

    struct Silent;

    impl Transport for Silent {
        async fn send_chunk(
            &self,
            _: &RecipientId,
            _: &str,
        ) -> std::result::Result<(), DeliveryFailure> {
            Ok(())
        }
    }

    #[test]
    fn unpinned_clock_is_utc() {
        let notifier = Notifier::new(Silent, "org");
        let drift = notifier.now() - Utc::now().naive_utc();
        assert!(drift.num_seconds().abs() < 5);
    }

    #[test]
    fn pinned_clock_wins() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let notifier = Notifier::new(Silent, "org").with_now(at);
        assert_eq!(notifier.now(), at);
    }

    #[test]
    fn horizon_is_three_days_out() {
        let today = NaiveDate::from_ymd_opt(2026, 12, 30).unwrap();
        assert_eq!(
            reminder_horizon(today),
            NaiveDate::from_ymd_opt(2027, 1, 2).unwrap()
        );
    }
}
