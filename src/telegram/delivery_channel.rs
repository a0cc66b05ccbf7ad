use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::delivery::DeliveryChannel;
use crate::reminder::{OwnerId, ReminderPayload};

/// Sends fired reminders back into Telegram: text payloads as a message,
/// voice payloads by re-sending the stored file id.
pub struct TelegramDeliveryChannel {
    bot: Bot,
}

impl TelegramDeliveryChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramDeliveryChannel {
    async fn deliver(&self, owner: OwnerId, payload: &ReminderPayload) -> anyhow::Result<()> {
        let chat_id = ChatId(owner);
        match payload {
            ReminderPayload::Text(text) => {
                self.bot
                    .send_message(chat_id, format!("Reminder: {text}"))
                    .await?;
            }
            ReminderPayload::Voice(file_id) => {
                self.bot
                    .send_voice(chat_id, InputFile::file_id(file_id.clone()))
                    .await?;
            }
        }
        Ok(())
    }
}
