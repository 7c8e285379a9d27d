//! SQLite storage layer.
//!
//! Holds employees, their linked Telegram recipients and assignments with
//! notification state. Workflows read snapshots through
//! [`Storage::load_assignments`] and write back through the
//! [`StateStore`] implementation, one record at a time.

use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::error::{Error, Result};
use crate::model::*;
use crate::notify::StateStore;

/// Storage backend. Owns the SQLite connection.
pub struct Storage {
    conn: Connection,
}

/// Which assignments to load.
#[derive(Debug, Clone, Default)]
pub enum AssignmentFilter {
    #[default]
    All,
    Status(Vec<Status>),
    Ids(Vec<AssignmentId>),
}

/// Outcome of a `/start` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// First time this chat was seen.
    Created,
    /// Known chat, not linked to an employee yet.
    Unlinked,
    /// Known chat linked to this employee.
    Linked(Person),
}

/// A registered chat and the employee it is linked to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRecipient {
    pub profile: RecipientProfile,
    pub employee: Option<EmployeeId>,
}

/// Builder for a new employee.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

impl NewEmployee {
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            middle_name: None,
            department: None,
            position: None,
        }
    }

    pub fn middle_name(mut self, middle: impl Into<String>) -> Self {
        self.middle_name = Some(middle.into());
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
}

/// Builder for a new assignment. Starts as NEW with no notices sent.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub(crate) assignment_type: String,
    pub(crate) document_number: String,
    pub(crate) description: String,
    pub(crate) issue_date: NaiveDate,
    pub(crate) deadline: NaiveDate,
    pub(crate) executor: EmployeeId,
    pub(crate) controller: Option<EmployeeId>,
    pub(crate) approver: Option<EmployeeId>,
}

impl NewAssignment {
    pub fn new(
        assignment_type: impl Into<String>,
        document_number: impl Into<String>,
        description: impl Into<String>,
        issue_date: NaiveDate,
        deadline: NaiveDate,
        executor: EmployeeId,
    ) -> Self {
        Self {
            assignment_type: assignment_type.into(),
            document_number: document_number.into(),
            description: description.into(),
            issue_date,
            deadline,
            executor,
            controller: None,
            approver: None,
        }
    }

    pub fn controller(mut self, id: EmployeeId) -> Self {
        self.controller = Some(id);
        self
    }

    pub fn approver(mut self, id: EmployeeId) -> Self {
        self.approver = Some(id);
        self
    }
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS employees (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                last_name       TEXT NOT NULL,
                first_name      TEXT NOT NULL,
                middle_name     TEXT,
                department      TEXT,
                position        TEXT
            );

            CREATE TABLE IF NOT EXISTS recipients (
                chat_id         TEXT PRIMARY KEY,
                username        TEXT,
                first_name      TEXT,
                last_name       TEXT,
                employee_id     INTEGER UNIQUE REFERENCES employees(id) ON DELETE SET NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                assignment_type         TEXT NOT NULL,
                document_number         TEXT NOT NULL,
                description             TEXT NOT NULL,
                issue_date              TEXT NOT NULL,
                deadline                TEXT NOT NULL,
                status                  TEXT NOT NULL DEFAULT 'NEW',
                executor_id             INTEGER NOT NULL REFERENCES employees(id),
                controller_id           INTEGER REFERENCES employees(id),
                approver_id             INTEGER REFERENCES employees(id),
                notified_created        INTEGER NOT NULL DEFAULT 0,
                last_notified_deadline  TEXT,
                last_reminded_deadline  TEXT,
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_status ON assignments(status);
            CREATE INDEX IF NOT EXISTS idx_assignments_deadline ON assignments(deadline);
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Employees and recipients
    // -----------------------------------------------------------------------

    pub fn insert_employee(&mut self, new: &NewEmployee) -> Result<EmployeeId> {
        self.conn.execute(
            "INSERT INTO employees (last_name, first_name, middle_name, department, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.last_name,
                new.first_name,
                new.middle_name,
                new.department,
                new.position,
            ],
        )?;
        Ok(EmployeeId(self.conn.last_insert_rowid()))
    }

    /// Link a chat id to an employee. An employee has at most one chat and
    /// a chat belongs to at most one employee; older links are replaced.
    pub fn link_recipient(&mut self, employee: EmployeeId, chat_id: &RecipientId) -> Result<()> {
        let tx = self.conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM employees WHERE id = ?1",
                params![employee.0],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("employee {employee}")));
        }

        tx.execute(
            "UPDATE recipients SET employee_id = NULL WHERE employee_id = ?1",
            params![employee.0],
        )?;
        tx.execute(
            "INSERT INTO recipients (chat_id, employee_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET employee_id = excluded.employee_id",
            params![chat_id.as_str(), employee.0, Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Record a chat that sent `/start`. Profile fields are refreshed on
    /// every call; an existing employee link is kept.
    pub fn register_recipient(&mut self, profile: &RecipientProfile) -> Result<Registration> {
        let tx = self.conn.transaction()?;

        let existing: Option<Option<i64>> = tx
            .query_row(
                "SELECT employee_id FROM recipients WHERE chat_id = ?1",
                params![profile.chat_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO recipients (chat_id, username, first_name, last_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chat_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name",
            params![
                profile.chat_id.as_str(),
                profile.username,
                profile.first_name,
                profile.last_name,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        match existing {
            None => Ok(Registration::Created),
            Some(None) => Ok(Registration::Unlinked),
            Some(Some(employee)) => {
                let person = self.get_person(EmployeeId(employee))?;
                Ok(Registration::Linked(person))
            }
        }
    }

    /// All registered chats, newest first.
    pub fn list_recipients(&self) -> Result<Vec<RegisteredRecipient>> {
        let mut stmt = self.conn.prepare(
            "SELECT chat_id, username, first_name, last_name, employee_id
             FROM recipients ORDER BY created_at DESC, chat_id",
        )?;
        let recipients = stmt
            .query_map([], |row| {
                Ok(RegisteredRecipient {
                    profile: RecipientProfile {
                        chat_id: RecipientId(row.get(0)?),
                        username: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                    },
                    employee: row.get::<_, Option<i64>>(4)?.map(EmployeeId),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(recipients)
    }

    /// Load one employee with its linked recipient.
    pub fn get_person(&self, id: EmployeeId) -> Result<Person> {
        load_person(&self.conn, id)?.ok_or_else(|| Error::NotFound(format!("employee {id}")))
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    pub fn insert_assignment(&mut self, new: &NewAssignment) -> Result<AssignmentId> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO assignments (
                assignment_type, document_number, description, issue_date, deadline,
                status, executor_id, controller_id, approver_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                new.assignment_type,
                new.document_number,
                new.description,
                new.issue_date,
                new.deadline,
                Status::New.as_str(),
                new.executor.0,
                new.controller.map(|id| id.0),
                new.approver.map(|id| id.0),
                now,
            ],
        )?;
        Ok(AssignmentId(self.conn.last_insert_rowid()))
    }

    pub fn get_assignment(&self, id: AssignmentId) -> Result<AssignmentRecord> {
        let mut records = self.load_assignments(&AssignmentFilter::Ids(vec![id]))?;
        records
            .pop()
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))
    }

    /// Snapshot of assignments matching `filter`, newest issue date first.
    pub fn load_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<AssignmentRecord>> {
        const COLUMNS: &str = "SELECT id, assignment_type, document_number, description,
                issue_date, deadline, status, executor_id, controller_id, approver_id,
                notified_created, last_notified_deadline, last_reminded_deadline
             FROM assignments";
        const ORDER: &str = "ORDER BY issue_date DESC, id ASC";

        let (sql, args): (String, Vec<Value>) = match filter {
            AssignmentFilter::All => (format!("{COLUMNS} {ORDER}"), Vec::new()),
            AssignmentFilter::Status(statuses) => (
                format!(
                    "{COLUMNS} WHERE status IN ({}) {ORDER}",
                    placeholders(statuses.len())
                ),
                statuses
                    .iter()
                    .map(|s| Value::from(s.as_str().to_string()))
                    .collect(),
            ),
            AssignmentFilter::Ids(ids) => (
                format!("{COLUMNS} WHERE id IN ({}) {ORDER}", placeholders(ids.len())),
                ids.iter().map(|id| Value::from(id.0)).collect(),
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), AssignmentRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| row.into_record(&self.conn))
            .collect()
    }

    /// Management-layer edit of a deadline. Notification state is untouched
    /// so the deadline-change workflow picks the record up.
    pub fn update_deadline(&mut self, id: AssignmentId, deadline: NaiveDate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE assignments SET deadline = ?1, updated_at = ?2 WHERE id = ?3",
            params![deadline, Utc::now().to_rfc3339(), id.0],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("assignment {id}")));
        }
        Ok(())
    }

    /// Mark open assignments whose deadline is before `today` as OVERDUE.
    /// Returns how many were updated.
    pub fn mark_overdue(&mut self, today: NaiveDate) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE assignments SET status = ?1, updated_at = ?2
             WHERE status IN (?3, ?4) AND deadline < ?5",
            params![
                Status::Overdue.as_str(),
                Utc::now().to_rfc3339(),
                Status::New.as_str(),
                Status::InProgress.as_str(),
                today,
            ],
        )?;
        Ok(updated)
    }
}

impl StateStore for Storage {
    fn save_notification_state(&mut self, record: &AssignmentRecord) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE assignments SET
                notified_created = ?1,
                last_notified_deadline = ?2,
                last_reminded_deadline = ?3,
                status = ?4,
                updated_at = ?5
             WHERE id = ?6",
            params![
                record.notified_created,
                record.last_notified_deadline,
                record.last_reminded_deadline,
                record.status.as_str(),
                Utc::now().to_rfc3339(),
                record.id.0,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("assignment {}", record.id)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

struct AssignmentRow {
    id: i64,
    assignment_type: String,
    document_number: String,
    description: String,
    issue_date: NaiveDate,
    deadline: NaiveDate,
    status: String,
    executor_id: i64,
    controller_id: Option<i64>,
    approver_id: Option<i64>,
    notified_created: bool,
    last_notified_deadline: Option<NaiveDate>,
    last_reminded_deadline: Option<NaiveDate>,
}

impl AssignmentRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            assignment_type: row.get(1)?,
            document_number: row.get(2)?,
            description: row.get(3)?,
            issue_date: row.get(4)?,
            deadline: row.get(5)?,
            status: row.get(6)?,
            executor_id: row.get(7)?,
            controller_id: row.get(8)?,
            approver_id: row.get(9)?,
            notified_created: row.get(10)?,
            last_notified_deadline: row.get(11)?,
            last_reminded_deadline: row.get(12)?,
        })
    }

    fn into_record(self, conn: &Connection) -> Result<AssignmentRecord> {
        let executor = load_person(conn, EmployeeId(self.executor_id))?.ok_or_else(|| {
            Error::NotFound(format!(
                "executor {} of assignment #{}",
                self.executor_id, self.id
            ))
        })?;
        let controller = match self.controller_id {
            Some(id) => load_person(conn, EmployeeId(id))?,
            None => None,
        };
        let approver = match self.approver_id {
            Some(id) => load_person(conn, EmployeeId(id))?,
            None => None,
        };

        Ok(AssignmentRecord {
            id: AssignmentId(self.id),
            assignment_type: self.assignment_type,
            document_number: self.document_number,
            description: self.description,
            issue_date: self.issue_date,
            deadline: self.deadline,
            status: self.status.parse()?,
            executor,
            controller,
            approver,
            notified_created: self.notified_created,
            last_notified_deadline: self.last_notified_deadline,
            last_reminded_deadline: self.last_reminded_deadline,
        })
    }
}

fn load_person(conn: &Connection, id: EmployeeId) -> Result<Option<Person>> {
    let person = conn
        .query_row(
            "SELECT e.last_name, e.first_name, e.middle_name, e.department, e.position, r.chat_id
             FROM employees e LEFT JOIN recipients r ON r.employee_id = e.id
             WHERE e.id = ?1",
            params![id.0],
            |row| {
                Ok(Person {
                    last_name: row.get(0)?,
                    first_name: row.get(1)?,
                    middle_name: row
                        .get::<_, Option<String>>(2)?
                        .filter(|m| !m.is_empty()),
                    department: row.get(3)?,
                    position: row.get(4)?,
                    recipient: row.get::<_, Option<String>>(5)?.map(RecipientId),
                })
            },
        )
        .optional()?;
    Ok(person)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
