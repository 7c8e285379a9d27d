//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use assignment_notify::error::{Error, Result};
use assignment_notify::event::DeliveryFailure;
use assignment_notify::model::*;
use assignment_notify::notify::{StateStore, Transport};
use chrono::{NaiveDate, NaiveDateTime};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 2026-03-10 09:30, the pinned clock of every workflow test.
pub fn now() -> NaiveDateTime {
    date(2026, 3, 10).and_hms_opt(9, 30, 0).unwrap()
}

pub fn today() -> NaiveDate {
    now().date()
}

pub fn executor(chat: &str) -> Person {
    Person::new("Сидоров", "Пётр")
        .middle_name("Ильич")
        .position("Инженер")
        .department("Отдел главного механика")
        .recipient(chat)
}

pub fn controller(last: &str, first: &str) -> Person {
    Person::new(last, first).middle_name("Андреевич")
}

pub fn record(id: i64, executor: Person, deadline: NaiveDate) -> AssignmentRecord {
    AssignmentRecord {
        id: AssignmentId(id),
        assignment_type: "Приказ".into(),
        document_number: format!("{id}-к"),
        description: format!("Текст поручения {id}"),
        issue_date: date(2026, 3, 1),
        deadline,
        status: Status::New,
        executor,
        controller: Some(controller("Кузнецов", "Олег")),
        approver: None,
        notified_created: false,
        last_notified_deadline: None,
        last_reminded_deadline: None,
    }
}

/// A record that already had its creation notice delivered.
pub fn notified(mut r: AssignmentRecord) -> AssignmentRecord {
    r.notified_created = true;
    r.last_notified_deadline = Some(r.deadline);
    r.status = Status::InProgress;
    r
}

/// Transport that records every chunk and fails for chosen recipients.
#[derive(Default)]
pub struct ScriptedTransport {
    pub sent: Mutex<Vec<(RecipientId, String)>>,
    pub failing: Vec<RecipientId>,
    /// Reject every chunk once this many have been accepted.
    pub fail_after: Option<usize>,
}

impl ScriptedTransport {
    pub fn failing_for(chats: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: chats.iter().map(|c| RecipientId::new(*c)).collect(),
            fail_after: None,
        }
    }

    pub fn failing_after(accepted: usize) -> Self {
        Self {
            fail_after: Some(accepted),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(RecipientId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// All chunks sent to one recipient, joined back into one text.
    pub fn text_for(&self, chat: &str) -> String {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r.as_str() == chat)
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Transport for ScriptedTransport {
    async fn send_chunk(
        &self,
        recipient: &RecipientId,
        text: &str,
    ) -> std::result::Result<(), DeliveryFailure> {
        let accepted = self.sent.lock().unwrap().len();
        if self.fail_after.is_some_and(|n| accepted >= n) {
            return Err(DeliveryFailure::Network {
                message: "connection reset".into(),
            });
        }
        if self.failing.contains(recipient) {
            return Err(DeliveryFailure::Rejected {
                status: 403,
                body: "Forbidden: bot was blocked by the user".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), text.to_string()));
        Ok(())
    }
}

/// State store that keeps every committed snapshot.
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Vec<AssignmentRecord>,
}

impl MemoryStore {
    pub fn saved_ids(&self) -> Vec<i64> {
        self.saved.iter().map(|r| r.id.0).collect()
    }
}

impl StateStore for MemoryStore {
    fn save_notification_state(&mut self, record: &AssignmentRecord) -> Result<()> {
        self.saved.push(record.clone());
        Ok(())
    }
}

/// State store that rejects its `fail_on`-th save (1-based).
pub struct FlakyStore {
    pub fail_on: usize,
    pub calls: usize,
    pub saved: Vec<AssignmentRecord>,
}

impl FlakyStore {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: call,
            calls: 0,
            saved: Vec::new(),
        }
    }
}

impl StateStore for FlakyStore {
    fn save_notification_state(&mut self, record: &AssignmentRecord) -> Result<()> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(Error::Other("disk I/O error".into()));
        }
        self.saved.push(record.clone());
        Ok(())
    }
}
