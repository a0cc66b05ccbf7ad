use std::sync::Arc;

use chrono::NaiveTime;
use teloxide::dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::macros::BotCommands;
use teloxide::prelude::*;

use crate::error::SchedulerError;
use crate::recurrence;
use crate::reminder::{Reminder, ReminderId, ReminderPayload};
use crate::scheduling::ReminderScheduler;

use super::{GlobalCommand, GlobalDialogue, GlobalState, HandlerResult, extract_payload};

#[derive(Clone)]
pub(super) enum EditReminderState {
    ReceiveFiringTime {
        id: ReminderId,
    },
    ReceivePayload {
        id: ReminderId,
        firing_time: NaiveTime,
    },
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", parse_with = "split", command_separator = "_")]
enum ReminderActionCommand {
    Edit(ReminderId),
    Delete(ReminderId),
}

async fn list_reminders(
    bot: Bot,
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    let reminders = scheduler.list_reminders(msg.chat.id.0).await;
    if reminders.is_empty() {
        bot.send_message(msg.chat.id, "You have not set any reminders.")
            .await?;
        return Ok(());
    }

    let message = reminders
        .iter()
        .map(display_reminder)
        .collect::<Vec<String>>()
        .join("\n\n");
    bot.send_message(msg.chat.id, format!("🔔 Your reminders:\n\n{message}"))
        .await?;

    Ok(())
}

fn display_reminder(reminder: &Reminder) -> String {
    let task = match &reminder.payload {
        ReminderPayload::Text(text) => text.as_str(),
        ReminderPayload::Voice(_) => "[voice note]",
    };
    format!(
        "{0}: {task} at {1} ({2})\nEdit - /edit_{0}, delete - /delete_{0}",
        reminder.id,
        reminder.fire_at.format("%Y-%m-%d %H:%M"),
        reminder.recurrence
    )
}

async fn delete_reminder(
    id: ReminderId,
    bot: Bot,
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    match scheduler.delete_reminder(msg.chat.id.0, id).await {
        Ok(()) => {
            bot.send_message(msg.chat.id, "Reminder deleted.").await?;
        }
        Err(SchedulerError::NotFound { .. }) => {
            bot.send_message(msg.chat.id, "Reminder not found.").await?;
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

async fn edit_reminder_start(
    id: ReminderId,
    bot: Bot,
    dialogue: GlobalDialogue,
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    let reminder = match scheduler.get_reminder(msg.chat.id.0, id).await {
        Ok(reminder) => reminder,
        Err(SchedulerError::NotFound { .. }) => {
            bot.send_message(msg.chat.id, "Reminder not found.").await?;
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    bot.send_message(
        msg.chat.id,
        format!(
            "Reminder currently fires at {}. Please send the new time (e.g. 13:00).",
            reminder.fire_at.format("%H:%M")
        ),
    )
    .await?;

    dialogue
        .update(GlobalState::EditReminder(
            EditReminderState::ReceiveFiringTime { id },
        ))
        .await?;

    Ok(())
}

async fn receive_new_firing_time(
    bot: Bot,
    dialogue: GlobalDialogue,
    id: ReminderId,
    msg: Message,
) -> HandlerResult {
    match msg
        .text()
        .map(|text| NaiveTime::parse_from_str(text, "%H:%M"))
    {
        Some(Ok(time)) => {
            bot.send_message(
                msg.chat.id,
                "Now send the new task, as text or as a voice note.",
            )
            .await?;

            dialogue
                .update(GlobalState::EditReminder(EditReminderState::ReceivePayload {
                    id,
                    firing_time: time,
                }))
                .await?;
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                "Could not parse time. Please send time in the following format: \"13:00\"",
            )
            .await?;
        }
    }
    Ok(())
}

async fn receive_new_payload(
    bot: Bot,
    dialogue: GlobalDialogue,
    (id, firing_time): (ReminderId, NaiveTime),
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    let Some(payload) = extract_payload(&msg) else {
        bot.send_message(msg.chat.id, "Please send the task as text or a voice note.")
            .await?;
        return Ok(());
    };

    let fire_at = recurrence::upcoming_fire_time(firing_time, scheduler.now());
    match scheduler
        .edit_reminder(msg.chat.id.0, id, Some(fire_at), Some(payload))
        .await
    {
        Ok(()) => {
            bot.send_message(msg.chat.id, "Reminder updated.").await?;
        }
        Err(SchedulerError::NotFound { .. }) => {
            bot.send_message(msg.chat.id, "Reminder not found.").await?;
        }
        Err(error) => return Err(error.into()),
    }
    dialogue.exit().await?;

    Ok(())
}

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            case![GlobalState::Idle]
                .branch(
                    teloxide::filter_command::<GlobalCommand, _>()
                        .branch(case![GlobalCommand::Reminders].endpoint(list_reminders)),
                )
                .branch(
                    teloxide::filter_command::<ReminderActionCommand, _>()
                        .branch(case![ReminderActionCommand::Edit(id)].endpoint(edit_reminder_start))
                        .branch(case![ReminderActionCommand::Delete(id)].endpoint(delete_reminder)),
                ),
        )
        .branch(
            case![GlobalState::EditReminder(x)]
                .branch(
                    case![EditReminderState::ReceiveFiringTime { id }]
                        .endpoint(receive_new_firing_time),
                )
                .branch(
                    case![EditReminderState::ReceivePayload { id, firing_time }]
                        .endpoint(receive_new_payload),
                ),
        )
}
