//! Registration bot.
//!
//! Long-polls `getUpdates` and answers `/start`: the sender's chat is
//! registered (or its profile refreshed) and told whether it is linked to
//! an employee yet. Linking stays an operator action, see
//! [`Storage::link_recipient`].

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{RecipientId, RecipientProfile};
use crate::notify::{TelegramTransport, Transport};
use crate::storage::{Registration, Storage};

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Bot API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A `/start` from a person: who sent it and where to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub profile: RecipientProfile,
    pub reply_to: RecipientId,
}

impl Update {
    /// The `/start` command carried by this update, if any. Accepts
    /// `/start@BotName` and a trailing payload.
    pub fn start_command(&self) -> Option<StartCommand> {
        let message = self.message.as_ref()?;
        let from = message.from.as_ref().filter(|u| !u.is_bot)?;
        let command = message.text.as_deref()?.split_whitespace().next()?;
        if command != "/start" && !command.starts_with("/start@") {
            return None;
        }

        let profile = RecipientProfile {
            chat_id: RecipientId::new(from.id.to_string()),
            username: from.username.clone(),
            first_name: Some(from.first_name.clone()).filter(|n| !n.is_empty()),
            last_name: from.last_name.clone(),
        };
        Some(StartCommand {
            profile,
            reply_to: RecipientId::new(message.chat.id.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Answer to `/start` for each registration outcome.
pub fn welcome_text(
    organization: &str,
    command: &StartCommand,
    registration: &Registration,
) -> String {
    let name = escape_html(
        command
            .profile
            .first_name
            .as_deref()
            .unwrap_or("Пользователь"),
    );

    match registration {
        Registration::Created => format!(
            "Добрый день, <b>{name}</b>.\n\n\
             Ваш аккаунт зарегистрирован в системе контроля исполнения поручений {organization}.\n\n\
             <b>Ваш Telegram ID:</b> <code>{id}</code>\n\n\
             <i>После того как администратор привяжет ваш профиль к учётной записи сотрудника, \
             вы начнёте получать уведомления о поручениях.</i>",
            id = command.profile.chat_id,
        ),
        Registration::Linked(employee) => format!(
            "Добрый день, <b>{name}</b>.\n\n\
             Ваш профиль привязан к учётной записи сотрудника:\n\
             <b>{full_name}</b>\n\
             <i>{position}  ·  {department}</i>\n\n\
             Уведомления о поручениях будут поступать на этот аккаунт.",
            full_name = employee.full_name(),
            position = employee
                .position
                .as_deref()
                .unwrap_or("должность не указана"),
            department = employee
                .department
                .as_deref()
                .unwrap_or("подразделение не указано"),
        ),
        Registration::Unlinked => format!(
            "Добрый день, <b>{name}</b>.\n\n\
             Ваш аккаунт зарегистрирован, однако ещё не привязан к учётной записи сотрудника.\n\n\
             <i>Обратитесь к администратору системы для завершения настройки.</i>"
        ),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Register the sender of a `/start` and answer it.
///
/// Returns whether the update was a `/start`. A failed reply is logged and
/// the registration stands; storage errors propagate.
pub async fn handle_update<T>(
    storage: &mut Storage,
    transport: &T,
    organization: &str,
    update: &Update,
) -> Result<bool>
where
    T: Transport + ?Sized,
{
    let Some(command) = update.start_command() else {
        return Ok(false);
    };

    let registration = storage.register_recipient(&command.profile)?;
    tracing::info!(
        recipient = %command.profile,
        created = matches!(registration, Registration::Created),
        linked = matches!(registration, Registration::Linked(_)),
        "recipient registered"
    );

    let text = welcome_text(organization, &command, &registration);
    if let Err(reason) = transport.send_chunk(&command.reply_to, &text).await {
        tracing::warn!(recipient = %command.reply_to, %reason, "reply to /start failed");
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// `getUpdates` long-polling client. Tracks the update offset.
pub struct UpdatePoller {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
    offset: i64,
}

impl UpdatePoller {
    pub fn new(token: SecretString, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            offset: 0,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.telegram_bot_token.clone().ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN is required to run the bot".to_string())
        })?;
        Ok(Self::new(token, &config.telegram_api_base))
    }

    async fn fetch(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let url = format!(
            "{}/bot{}/getUpdates",
            self.api_base,
            self.token.expose_secret()
        );
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await
            .map_err(|e| Error::Telegram(format!("getUpdates failed: {}", e.without_url())))?;

        let body: ApiResponse<Vec<Update>> = resp.json().await.map_err(|e| {
            Error::Telegram(format!("invalid getUpdates response: {}", e.without_url()))
        })?;
        if !body.ok {
            return Err(Error::Telegram(format!(
                "getUpdates rejected: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(body.result.unwrap_or_default())
    }

    /// Drop updates queued while the bot was offline.
    pub async fn skip_pending(&mut self) -> Result<()> {
        let updates = self.fetch(-1, 0).await?;
        self.advance(&updates);
        Ok(())
    }

    /// Wait for the next batch of updates and move past it.
    pub async fn next_batch(&mut self) -> Result<Vec<Update>> {
        let updates = self.fetch(self.offset, POLL_TIMEOUT_SECS).await?;
        self.advance(&updates);
        Ok(updates)
    }

    fn advance(&mut self, updates: &[Update]) {
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset = self.offset.max(last + 1);
        }
    }
}

/// Serve `/start` until Ctrl-C. Polling errors are logged and retried.
pub async fn run(config: &Config, storage: &mut Storage) -> Result<()> {
    let mut poller = UpdatePoller::from_config(config)?;
    let transport = TelegramTransport::from_config(config);
    poller.skip_pending().await?;
    tracing::info!("registration bot started");

    loop {
        let batch = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            batch = poller.next_batch() => batch,
        };

        match batch {
            Ok(updates) => {
                for update in &updates {
                    handle_update(storage, &transport, &config.organization, update).await?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "polling failed; retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    tracing::info!("registration bot stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::event::DeliveryFailure;
    use crate::model::EmployeeId;
    use crate::storage::NewEmployee;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    fn start_from(id: i64, first_name: &str) -> Update {
        update(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "date": 0,
                "from": {"id": id, "is_bot": false, "first_name": first_name, "username": "psidorov"},
                "chat": {"id": id, "type": "private"},
                "text": "/start"
            }
        }))
    }

    #[derive(Default)]
    struct Replies(Mutex<Vec<(RecipientId, String)>>);

    impl Transport for Replies {
        async fn send_chunk(
            &self,
            recipient: &RecipientId,
            text: &str,
        ) -> std::result::Result<(), DeliveryFailure> {
            self.0
                .lock()
                .unwrap()
                .push((recipient.clone(), text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn start_command_variants() {
        let plain = start_from(42, "Пётр").start_command().unwrap();
        assert_eq!(plain.profile.chat_id, RecipientId::new("42"));
        assert_eq!(plain.profile.username.as_deref(), Some("psidorov"));
        assert_eq!(plain.profile.first_name.as_deref(), Some("Пётр"));
        assert_eq!(plain.reply_to, RecipientId::new("42"));

        let mut addressed = start_from(42, "Пётр");
        addressed.message.as_mut().unwrap().text = Some("/start@DolomitBot ref".into());
        assert!(addressed.start_command().is_some());

        let mut other = start_from(42, "Пётр");
        other.message.as_mut().unwrap().text = Some("/started".into());
        assert!(other.start_command().is_none());

        let mut from_bot = start_from(42, "Пётр");
        from_bot.message.as_mut().unwrap().from.as_mut().unwrap().is_bot = true;
        assert!(from_bot.start_command().is_none());

        let edited = update(serde_json::json!({"update_id": 11}));
        assert!(edited.start_command().is_none());
    }

    #[test]
    fn welcome_texts() {
        let command = start_from(42, "<Пётр>").start_command().unwrap();

        let created = welcome_text("ОАО «Доломит»", &command, &Registration::Created);
        assert!(created.starts_with("Добрый день, <b>&lt;Пётр&gt;</b>."));
        assert!(created.contains("системе контроля исполнения поручений ОАО «Доломит»."));
        assert!(created.contains("<b>Ваш Telegram ID:</b> <code>42</code>"));

        let unlinked = welcome_text("ОАО «Доломит»", &command, &Registration::Unlinked);
        assert!(unlinked.contains("однако ещё не привязан к учётной записи сотрудника."));

        let employee = crate::model::Person::new("Сидоров", "Пётр").middle_name("Ильич");
        let linked = welcome_text("ОАО «Доломит»", &command, &Registration::Linked(employee));
        assert!(linked.contains("<b>Сидоров Пётр Ильич</b>\n"));
        assert!(linked.contains("<i>должность не указана  ·  подразделение не указано</i>"));
    }

    #[tokio::test]
    async fn start_registers_then_reports_link_state() {
        let mut storage = Storage::in_memory().unwrap();
        let replies = Replies::default();
        let start = start_from(42, "Пётр");

        assert!(handle_update(&mut storage, &replies, "ОАО «Доломит»", &start).await.unwrap());
        assert!(handle_update(&mut storage, &replies, "ОАО «Доломит»", &start).await.unwrap());

        let employee: EmployeeId = storage
            .insert_employee(
                &NewEmployee::new("Сидоров", "Пётр")
                    .position("Инженер")
                    .department("Отдел главного механика"),
            )
            .unwrap();
        storage
            .link_recipient(employee, &RecipientId::new("42"))
            .unwrap();
        assert!(handle_update(&mut storage, &replies, "ОАО «Доломит»", &start).await.unwrap());

        let sent = replies.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].1.contains("<code>42</code>"));
        assert!(sent[1].1.contains("ещё не привязан"));
        assert!(sent[2].1.contains("<i>Инженер  ·  Отдел главного механика</i>"));
    }

    #[tokio::test]
    async fn non_start_updates_are_ignored() {
        let mut storage = Storage::in_memory().unwrap();
        let replies = Replies::default();
        let mut hello = start_from(42, "Пётр");
        hello.message.as_mut().unwrap().text = Some("привет".into());

        assert!(!handle_update(&mut storage, &replies, "org", &hello).await.unwrap());
        assert!(storage.list_recipients().unwrap().is_empty());
        assert!(replies.0.lock().unwrap().is_empty());
    }

    #[test]
    fn offset_only_moves_forward() {
        let mut poller =
            UpdatePoller::new(SecretString::from("t".to_string()), "http://127.0.0.1:9/");
        assert_eq!(poller.api_base, "http://127.0.0.1:9");

        let first = start_from(1, "a");
        let mut later = start_from(1, "a");
        later.update_id = 25;
        poller.advance(&[later, first]);
        assert_eq!(poller.offset, 26);

        poller.advance(&[]);
        assert_eq!(poller.offset, 26);
    }
}
