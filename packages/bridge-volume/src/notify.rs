//! Progress notifications
//!
//! Sending is best effort: failures are logged and never affect a run.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Telegram bot push to a single chat
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    /// `None` when notifications are disabled by configuration.
    pub fn from_config(config: &NotificationConfig) -> Option<Self> {
        if !config.is_enabled() {
            debug!("Telegram notifications disabled");
            return None;
        }
        let chat_id = config.chat_id?;
        Some(Self {
            bot: Bot::new(config.telegram_token.expose()),
            chat_id: ChatId(chat_id),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        if let Err(e) = self.bot.send_message(self.chat_id, message).await {
            warn!(error = %e, "Failed to send Telegram notification");
        }
    }
}
