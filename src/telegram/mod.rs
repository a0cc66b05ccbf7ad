mod create_reminder;
mod delivery_channel;
mod edit_reminders;
mod set_birthday;

use std::sync::Arc;

use teloxide::dptree::{self, case};
use teloxide::{
    dispatching::dialogue, dispatching::dialogue::InMemStorage, macros::BotCommands, prelude::*,
    utils::command::BotCommands as _,
};

use crate::reminder::ReminderPayload;
use crate::scheduling::ReminderScheduler;

use create_reminder::CreateReminderState;
use edit_reminders::EditReminderState;

pub use delivery_channel::TelegramDeliveryChannel;

type GlobalDialogue = Dialogue<GlobalState, InMemStorage<GlobalState>>;
type HandlerResult = anyhow::Result<()>;

#[derive(Default, Clone)]
enum GlobalState {
    #[default]
    Idle,
    CreateReminder(CreateReminderState),
    EditReminder(EditReminderState),
    ReceiveBirthday,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum GlobalCommand {
    #[command(description = "show this menu")]
    Start,
    #[command(description = "create a new reminder")]
    Remind,
    #[command(description = "list your reminders")]
    Reminders,
    #[command(description = "register a birthday")]
    Birthday,
    #[command(description = "cancel the current operation")]
    Cancel,
}

pub struct TelegramInteractionInterface;

impl TelegramInteractionInterface {
    pub async fn start(bot: Bot, scheduler: Arc<ReminderScheduler>) {
        log::info!("Creating Telegram interaction interface");

        let start_handler = Update::filter_message().branch(
            teloxide::filter_command::<GlobalCommand, _>()
                .branch(case![GlobalCommand::Start].endpoint(start)),
        );
        let cancel_handler = Update::filter_message().branch(
            teloxide::filter_command::<GlobalCommand, _>()
                .branch(case![GlobalCommand::Cancel].endpoint(cancel)),
        );
        let invalid_state_handler = Update::filter_message().branch(dptree::endpoint(invalid_state));

        let schema = dialogue::enter::<Update, InMemStorage<GlobalState>, GlobalState, _>()
            .branch(start_handler)
            .branch(cancel_handler)
            .branch(create_reminder::schema())
            .branch(edit_reminders::schema())
            .branch(set_birthday::schema())
            .branch(invalid_state_handler);

        Dispatcher::builder(bot, schema)
            .dependencies(dptree::deps![InMemStorage::<GlobalState>::new(), scheduler])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await
    }
}

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!("🎉 Welcome!\n{}", GlobalCommand::descriptions()),
    )
    .await?;
    Ok(())
}

async fn cancel(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Cancelled current operation.")
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn invalid_state(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Unable to handle the message. Try /start.")
        .await?;
    dialogue.exit().await?;
    Ok(())
}

/// A reminder payload is either the message text or a voice note, kept as an
/// opaque file id.
fn extract_payload(msg: &Message) -> Option<ReminderPayload> {
    if let Some(voice) = msg.voice() {
        return Some(ReminderPayload::Voice(voice.file.id.clone()));
    }
    msg.text()
        .map(|text| ReminderPayload::Text(text.to_string()))
}
