use async_trait::async_trait;
use serde::Serialize;
use shared::{FeedbackRequest, TeamApplicationRequest, TelegramResponse};
use tracing::{error, info};

use crate::secret::Secret;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: String) -> TelegramResponse;

    async fn send_feedback(&self, request: &FeedbackRequest) -> TelegramResponse {
        self.send_message(feedback_message(request)).await
    }

    async fn send_team_application(&self, request: &TeamApplicationRequest) -> TelegramResponse {
        self.send_message(team_application_message(request)).await
    }
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn feedback_message(request: &FeedbackRequest) -> String {
    format!(
        "🎮 <b>Новое обращение с сайта</b>\n\
         \n\
         👤 <b>Игровой ник:</b> {}\n\
         📋 <b>Причина:</b> {}\n\
         💬 <b>Связь:</b> {} - {}\n\
         \n\
         📝 <b>Сообщение:</b>\n\
         {}",
        escape_html(&request.player_nick),
        escape_html(&request.reason),
        escape_html(&request.contact_method),
        escape_html(&request.contact_info),
        escape_html(&request.message),
    )
}

pub fn team_application_message(request: &TeamApplicationRequest) -> String {
    format!(
        "📝 <b>НОВАЯ ЗАЯВКА В КОМАНДУ</b>\n\
         \n\
         👤 <b>Ник:</b> {}\n\
         🌐 <b>Сервер:</b> {}\n\
         🛠 <b>Роль:</b> {}\n\
         ⏳ <b>Часы:</b> {}\n\
         🚫 <b>История наказаний:</b>\n\
         {}\n\
         \n\
         📱 <b>Discord:</b> {}\n\
         \n\
         🎯 <b>Причина/Мотивация:</b>\n\
         {}",
        escape_html(&request.player_nick),
        escape_html(&request.server),
        escape_html(&request.role),
        escape_html(&request.hours),
        escape_html(&request.history),
        escape_html(&request.discord),
        escape_html(&request.reason),
    )
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/**
https://core.telegram.org/bots/api#sendmessage
 */
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: Option<Secret<String>>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        client: reqwest::Client,
        api_url: &str,
        bot_token: Option<Secret<String>>,
        chat_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_ref().map(|t| t.reveal().as_str())?;
        let chat_id = self.chat_id.as_deref()?;

        (!token.is_empty() && !chat_id.is_empty()).then_some((token, chat_id))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, text: String) -> TelegramResponse {
        let Some((token, chat_id)) = self.credentials() else {
            error!("Telegram settings are not configured properly");
            return TelegramResponse::failed("Настройки Telegram не сконфигурированы");
        };

        let payload = SendMessage {
            chat_id,
            text: &text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, token))
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!("Message sent to Telegram successfully");
                TelegramResponse::sent("Сообщение успешно отправлено")
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(%status, %body, "Telegram API error");
                TelegramResponse::failed("Ошибка при отправке в Telegram")
            }
            Err(err) => {
                // reqwest errors carry the request URL, which holds the bot token
                error!(error = %err.without_url(), "Failed to send message to Telegram");
                TelegramResponse::failed("Произошла ошибка при отправке сообщения")
            }
        }
    }
}
