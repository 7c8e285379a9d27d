//! Message delivery over the Telegram Bot API.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{MAX_MESSAGE_LEN, split_message};
use crate::config::{Config, DEFAULT_API_BASE, DEFAULT_SEND_TIMEOUT_SECS};
use crate::event::{DeliveryEvent, DeliveryFailure, DiagnosticSink};
use crate::model::RecipientId;
use crate::telemetry::metrics;

/// Sends one prepared chunk to one recipient.
///
/// Failures are returned as values. Implementations must not panic on
/// transport errors.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_chunk(&self, recipient: &RecipientId, text: &str)
    -> Result<(), DeliveryFailure>;
}

impl<T: Transport + ?Sized> Transport for &T {
    async fn send_chunk(
        &self,
        recipient: &RecipientId,
        text: &str,
    ) -> Result<(), DeliveryFailure> {
        (**self).send_chunk(recipient, text).await
    }
}

/// Split `text` and send the chunks in order.
///
/// Stops at the first failed chunk and returns `false`. Chunks sent before
/// the failure are not retracted.
pub async fn deliver<T, S>(transport: &T, recipient: &RecipientId, text: &str, sink: &S) -> bool
where
    T: Transport + ?Sized,
    S: DiagnosticSink + ?Sized,
{
    let chunks = split_message(text, MAX_MESSAGE_LEN);
    let chunk_count = chunks.len();

    for (chunk_index, chunk) in chunks.iter().enumerate() {
        if let Err(reason) = transport.send_chunk(recipient, chunk).await {
            sink.record(DeliveryEvent::ChunkFailed {
                recipient: recipient.clone(),
                chunk_index,
                chunk_count,
                reason,
            });
            return false;
        }
        metrics::chunks_sent().add(1, &[]);
    }
    true
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// `sendMessage` client. Without a token every send fails with
/// [`DeliveryFailure::MissingCredentials`] and nothing goes over the wire.
pub struct TelegramTransport {
    client: reqwest::Client,
    token: Option<SecretString>,
    api_base: String,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.telegram_bot_token.clone())
            .api_base(&config.telegram_api_base)
            .timeout(config.send_timeout)
    }

    pub fn api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.token.is_some()
    }
}

impl Transport for TelegramTransport {
    async fn send_chunk(
        &self,
        recipient: &RecipientId,
        text: &str,
    ) -> Result<(), DeliveryFailure> {
        let Some(token) = &self.token else {
            return Err(DeliveryFailure::MissingCredentials);
        };
        if recipient.as_str().is_empty() {
            return Err(DeliveryFailure::MissingRecipient);
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, token.expose_secret());
        let resp = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: recipient.as_str(),
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .timeout(self.timeout)
            .send()
            .await
            // without_url keeps the token out of the message
            .map_err(|e| DeliveryFailure::Network {
                message: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(DeliveryFailure::Rejected { status, body })
        }
    }
}
