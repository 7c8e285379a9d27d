//! assignment-notify CLI: operator interface to the notification engine.

use assignment_notify::bot;
use assignment_notify::config::Config;
use assignment_notify::model::{AssignmentId, EmployeeId, RecipientId, Status};
use assignment_notify::notify::{Notifier, TelegramTransport};
use assignment_notify::storage::{AssignmentFilter, Storage};
use assignment_notify::telemetry::{SERVICE_NAME, TelemetryConfig, init_telemetry};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "assignment-notify", about = "Assignment notifications over Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one notification workflow
    Notify {
        #[arg(value_enum)]
        kind: NotifyKind,
        /// Only assignments with this status (repeatable)
        #[arg(long, conflicts_with = "ids")]
        status: Vec<String>,
        /// Only these assignment IDs (repeatable)
        #[arg(long = "id")]
        ids: Vec<i64>,
    },
    /// Mark open assignments past their deadline as OVERDUE
    MarkOverdue,
    /// Run the registration bot (answers /start) until Ctrl-C
    Bot,
    /// List chats registered through the bot
    Recipients,
    /// Link a Telegram chat to an employee
    Link {
        employee_id: i64,
        chat_id: String,
    },
    /// List assignments with their notification state
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Print records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum NotifyKind {
    /// Initial notice for new assignments
    New,
    /// Notice about moved deadlines
    Deadline,
    /// Reminder about approaching and expired deadlines
    Remind,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: SERVICE_NAME.to_string(),
        log_level: config.log_level.clone(),
    })?;

    let mut storage = Storage::open(&config.database_path)?;

    match cli.command {
        Command::Notify { kind, status, ids } => {
            cmd_notify(&config, &mut storage, kind, status, ids).await
        }
        Command::MarkOverdue => {
            let updated = storage.mark_overdue(Utc::now().date_naive())?;
            if updated > 0 {
                println!("Marked {updated} assignment(s) as OVERDUE.");
            } else {
                println!("No overdue assignments found.");
            }
            Ok(())
        }
        Command::Bot => Ok(bot::run(&config, &mut storage).await?),
        Command::Recipients => cmd_recipients(&storage),
        Command::Link {
            employee_id,
            chat_id,
        } => {
            storage.link_recipient(EmployeeId(employee_id), &RecipientId::new(chat_id.clone()))?;
            println!("Linked chat {chat_id} to employee {employee_id}.");
            Ok(())
        }
        Command::List { status, json } => cmd_list(&storage, status, json),
    }
}

async fn cmd_notify(
    config: &Config,
    storage: &mut Storage,
    kind: NotifyKind,
    status: Vec<String>,
    ids: Vec<i64>,
) -> anyhow::Result<()> {
    let filter = if !ids.is_empty() {
        AssignmentFilter::Ids(ids.into_iter().map(AssignmentId).collect())
    } else if !status.is_empty() {
        AssignmentFilter::Status(
            status
                .iter()
                .map(|s| s.parse::<Status>())
                .collect::<Result<_, _>>()?,
        )
    } else {
        AssignmentFilter::All
    };

    let transport = TelegramTransport::from_config(config);
    if !transport.has_credentials() {
        tracing::warn!("TELEGRAM_BOT_TOKEN is not set; every delivery will fail");
    }
    let notifier = Notifier::new(transport, config.organization.clone());

    let mut records = storage.load_assignments(&filter)?;
    let sent = match kind {
        NotifyKind::New => notifier.notify_new(&mut records, storage).await?,
        NotifyKind::Deadline => {
            notifier
                .notify_deadline_changes(&mut records, storage)
                .await?
        }
        NotifyKind::Remind => notifier.send_reminders(&mut records, storage).await?,
    };

    println!("Notified {sent} assignment(s).");
    Ok(())
}

fn cmd_list(storage: &Storage, status: Option<String>, json: bool) -> anyhow::Result<()> {
    let filter = match status {
        Some(s) => AssignmentFilter::Status(vec![s.parse()?]),
        None => AssignmentFilter::All,
    };
    let records = storage.load_assignments(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No assignments found.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<12}  {:<12}  {:<10}  {:<24}  {:<7}  {:<10}  REMINDED",
        "ID", "DOC", "STATUS", "DEADLINE", "EXECUTOR", "CREATED", "NOTIFIED"
    );
    println!("{}", "-".repeat(110));

    for r in &records {
        let dash = || "-".to_string();
        println!(
            "{:<6}  {:<12}  {:<12}  {:<10}  {:<24}  {:<7}  {:<10}  {}",
            r.id.0,
            r.document_number,
            r.status,
            r.deadline.to_string(),
            r.executor.short_name(),
            if r.notified_created { "yes" } else { "no" },
            r.last_notified_deadline.map(|d| d.to_string()).unwrap_or_else(dash),
            r.last_reminded_deadline.map(|d| d.to_string()).unwrap_or_else(dash),
        );
    }

    println!("\n{} assignment(s)", records.len());
    Ok(())
}

fn cmd_recipients(storage: &Storage) -> anyhow::Result<()> {
    let recipients = storage.list_recipients()?;
    if recipients.is_empty() {
        println!("No chats registered yet. Ask employees to send /start to the bot.");
        return Ok(());
    }

    for r in &recipients {
        let employee = r
            .employee
            .map(|id| format!("employee {id}"))
            .unwrap_or_else(|| "not linked".to_string());
        println!("{:<60}  {employee}", r.profile.to_string());
    }
    Ok(())
}
