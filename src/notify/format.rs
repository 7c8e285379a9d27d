//! Render assignments as Telegram HTML lines.
//!
//! Every function returns lines rather than a joined string so workflows
//! can splice headers, cards and annotations before the message is split.
//! Description text is passed through unescaped.

use chrono::{NaiveDate, NaiveDateTime};

use super::{CARD_DIVIDER, DASH, DIVIDER};
use crate::model::{AssignmentRecord, Person};

const DATE_FORMAT: &str = "%d.%m.%Y";

/// Formatter bound to an organization name and a generation timestamp.
#[derive(Debug, Clone)]
pub struct Formatter {
    organization: String,
    generated_at: NaiveDateTime,
}

impl Formatter {
    pub fn new(organization: impl Into<String>, generated_at: NaiveDateTime) -> Self {
        Self {
            organization: organization.into(),
            generated_at,
        }
    }

    /// Title, organization/timestamp line, divider and executor block.
    pub fn render_header(&self, title: &str, icon: &str, executor: &Person) -> Vec<String> {
        let position = executor.position.as_deref().unwrap_or("должность не указана");
        let department = executor
            .department
            .as_deref()
            .unwrap_or("подразделение не указано");
        vec![
            format!("{icon}  <b>{title}</b>"),
            format!(
                "<i>{}  ·  {}</i>",
                self.organization,
                self.generated_at.format("%d.%m.%Y,  %H:%M")
            ),
            DIVIDER.to_string(),
            String::new(),
            format!("👤  <b>{}</b>", full_name(Some(executor))),
            format!("<i>{position}  ·  {department}</i>"),
            String::new(),
        ]
    }

    /// One bordered assignment card.
    pub fn render_card(&self, record: &AssignmentRecord, index: usize, total: usize) -> Vec<String> {
        vec![
            format!("◾  <b>ПОРУЧЕНИЕ {index} / {total}</b>"),
            format!(
                "<b>{}</b>   <code>№ {}</code>",
                record.assignment_type.to_uppercase(),
                record.document_number
            ),
            CARD_DIVIDER.to_string(),
            "<b>Текст поручения:</b>".to_string(),
            format!("<blockquote>{}</blockquote>", record.description.trim()),
            String::new(),
            format!("📅  <b>Дата издания:</b>    {}", fmt_date(record.issue_date)),
            format!(
                "⏳  <b>Срок исполнения:</b>  <u>{}</u>",
                fmt_date(record.deadline)
            ),
            format!(
                "👤  <b>Контролирующий:</b>  {}",
                short_name(record.controller.as_ref())
            ),
            format!(
                "✅  <b>Визирующий:</b>      {}",
                short_name(record.approver.as_ref())
            ),
        ]
    }

    /// Closing divider, a workflow-specific note and the auto-generated line.
    pub fn render_footer(&self, note: &str) -> Vec<String> {
        vec![
            DIVIDER.to_string(),
            format!("<i>{note}</i>"),
            "<i>Уведомление сформировано автоматически.</i>".to_string(),
        ]
    }
}

/// Neutral annotation about the time left until the deadline.
pub fn render_deadline_note(days_left: i64) -> String {
    match days_left {
        d if d < 0 => format!("<i>Срок истёк {} назад.</i>", days_label(d)),
        0 => "<i>Срок исполнения — сегодня.</i>".to_string(),
        1 => "<i>Срок исполнения истекает завтра.</i>".to_string(),
        d => format!("<i>До срока исполнения: {}.</i>", days_label(d)),
    }
}

/// Struck-through old deadline, the new one and the shift wording.
pub fn render_deadline_change(old: NaiveDate, new: NaiveDate) -> Vec<String> {
    let shift = (new - old).num_days();
    let direction = if shift > 0 { "продлён" } else { "сокращён" };
    vec![
        "🔄  <b>Изменение срока:</b>".to_string(),
        format!(
            "     <s>{}</s>  →  <u><b>{}</b></u>",
            fmt_date(old),
            fmt_date(new)
        ),
        format!("     <i>Срок {direction} на {}.</i>", days_label(shift)),
    ]
}

/// `|n|` followed by the Russian word for "day" in the matching form.
pub fn days_label(n: i64) -> String {
    let abs = n.unsigned_abs();
    let word = if (11..=19).contains(&(abs % 100)) {
        "дней"
    } else {
        match abs % 10 {
            1 => "день",
            2..=4 => "дня",
            _ => "дней",
        }
    };
    format!("{abs} {word}")
}

/// "Last First Middle", or a dash for nobody.
pub fn full_name(person: Option<&Person>) -> String {
    person.map(Person::full_name).unwrap_or_else(|| DASH.to_string())
}

/// "Last F.M.", or a dash for nobody.
pub fn short_name(person: Option<&Person>) -> String {
    person.map(Person::short_name).unwrap_or_else(|| DASH.to_string())
}

pub fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
