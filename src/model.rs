//! Core data model.
//!
//! An assignment is a directive issued to one executor, with a deadline,
//! a controller who supervises it and an optional approver. The engine
//! reads the content and owns the notification-state fields.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Newtype for assignment IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(pub i64);

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Newtype for employee IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub i64);

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transport address of a person (a Telegram chat id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a chat reports about itself when it registers with the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub chat_id: RecipientId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl RecipientProfile {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: RecipientId::new(chat_id),
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }
}

/// Renders as "First Last (@username) [chat]".
impl std::fmt::Display for RecipientProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{name}")?;
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            write!(f, " (@{username})")?;
        }
        write!(f, " [{}]", self.chat_id)
    }
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// An employee as seen by the notification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    /// Unlinked accounts have no recipient and are skipped, not errored.
    pub recipient: Option<RecipientId>,
}

impl Person {
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            middle_name: None,
            department: None,
            position: None,
            recipient: None,
        }
    }

    pub fn middle_name(mut self, middle: impl Into<String>) -> Self {
        self.middle_name = Some(middle.into()).filter(|m: &String| !m.is_empty());
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(RecipientId::new(recipient));
        self
    }

    /// "Last First Middle", skipping empty parts.
    pub fn full_name(&self) -> String {
        [
            Some(self.last_name.as_str()),
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// "Last F.M.", with the middle initial only when a middle name is present.
    pub fn short_name(&self) -> String {
        let first = initial(&self.first_name);
        let middle = self.middle_name.as_deref().map(initial).unwrap_or_default();
        format!("{} {first}{middle}", self.last_name)
    }
}

fn initial(name: &str) -> String {
    name.chars().next().map(|c| format!("{c}.")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    InProgress,
    Done,
    Overdue,
}

impl Status {
    /// Still being worked on (eligible for reminders and overdue marking).
    pub fn is_open(self) -> bool {
        matches!(self, Status::New | Status::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
            Status::Overdue => "OVERDUE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NEW" => Ok(Status::New),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "DONE" => Ok(Status::Done),
            "OVERDUE" => Ok(Status::Overdue),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// A tracked assignment together with its notification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: AssignmentId,
    /// Type label, e.g. "Приказ" or "Распоряжение".
    pub assignment_type: String,
    pub document_number: String,
    pub description: String,
    pub issue_date: NaiveDate,
    pub deadline: NaiveDate,
    pub status: Status,

    pub executor: Person,
    pub controller: Option<Person>,
    pub approver: Option<Person>,

    /// The initial "new assignment" notice was delivered.
    pub notified_created: bool,
    /// Deadline as of the last delivered creation or change notice.
    pub last_notified_deadline: Option<NaiveDate>,
    /// Deadline as of the last delivered reminder.
    pub last_reminded_deadline: Option<NaiveDate>,
}

impl AssignmentRecord {
    /// Signed number of days from `today` to the deadline.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.deadline - today).num_days()
    }

    /// Sort key shared by all workflows: controller name, absent last.
    pub fn controller_key(&self) -> ControllerKey {
        match &self.controller {
            Some(person) => ControllerKey::Named(person.full_name()),
            None => ControllerKey::Absent,
        }
    }
}

/// Ordering key for an optional controller. `Absent` sorts after every name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControllerKey {
    Named(String),
    Absent,
}

// ---------------------------------------------------------------------------
// Urgency
// ---------------------------------------------------------------------------

/// Reminder grouping by how close the deadline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Expired,
    Today,
    Tomorrow,
    Soon,
}

impl Urgency {
    pub const ALL: [Urgency; 4] = [
        Urgency::Expired,
        Urgency::Today,
        Urgency::Tomorrow,
        Urgency::Soon,
    ];

    pub fn from_days_left(days_left: i64) -> Self {
        match days_left.cmp(&0) {
            Ordering::Less => Urgency::Expired,
            Ordering::Equal => Urgency::Today,
            Ordering::Greater if days_left == 1 => Urgency::Tomorrow,
            Ordering::Greater => Urgency::Soon,
        }
    }

    /// Section header shown above the cards of this bucket.
    pub fn section_title(self) -> &'static str {
        match self {
            Urgency::Expired => "Срок исполнения истёк",
            Urgency::Today => "Срок исполнения — сегодня",
            Urgency::Tomorrow => "Срок исполнения — завтра",
            Urgency::Soon => "Срок исполнения в течение 3 дней",
        }
    }

    /// Label used in the reminder summary block.
    pub fn summary_label(self) -> &'static str {
        match self {
            Urgency::Expired => "срок истёк",
            Urgency::Today => "срок сегодня",
            Urgency::Tomorrow => "срок завтра",
            Urgency::Soon => "срок в течение 3 дней",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Expired => "expired",
            Urgency::Today => "today",
            Urgency::Tomorrow => "tomorrow",
            Urgency::Soon => "soon",
        };
        write!(f, "{s}")
    }
}
