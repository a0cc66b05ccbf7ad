use std::sync::Arc;

use chrono::NaiveTime;
use teloxide::dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::recurrence;
use crate::reminder::Recurrence;
use crate::scheduling::ReminderScheduler;

use super::{GlobalCommand, GlobalDialogue, GlobalState, HandlerResult, extract_payload};

#[derive(Clone, Default)]
pub(super) enum CreateReminderState {
    #[default]
    Start,
    ReceiveFiringTime,
    ReceiveRecurrence {
        firing_time: NaiveTime,
    },
    ReceivePayload {
        firing_time: NaiveTime,
        recurrence: Recurrence,
    },
}

async fn create_reminder_start(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Creating a new reminder! Please enter the time it should fire at (e.g. 16:23). \
         If you want to cancel, use the /cancel command.",
    )
    .await?;

    dialogue
        .update(GlobalState::CreateReminder(
            CreateReminderState::ReceiveFiringTime,
        ))
        .await?;

    Ok(())
}

async fn receive_firing_time(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    match msg
        .text()
        .map(|text| NaiveTime::parse_from_str(text, "%H:%M"))
    {
        Some(Ok(time)) => {
            bot.send_message(
                msg.chat.id,
                "How should it repeat? (none, daily, weekly, monthly)",
            )
            .await?;

            dialogue
                .update(GlobalState::CreateReminder(
                    CreateReminderState::ReceiveRecurrence { firing_time: time },
                ))
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

async fn receive_recurrence(
    bot: Bot,
    dialogue: GlobalDialogue,
    firing_time: NaiveTime,
    msg: Message,
) -> HandlerResult {
    let recurrence = match msg.text().map(str::parse::<Recurrence>) {
        Some(Ok(recurrence)) => recurrence,
        _ => {
            bot.send_message(
                msg.chat.id,
                "How should it repeat? Please answer with one of: none, daily, weekly, monthly.",
            )
            .await?;
            return Ok(());
        }
    };

    bot.send_message(
        msg.chat.id,
        "Now send the task itself, as text or as a voice note.",
    )
    .await?;

    dialogue
        .update(GlobalState::CreateReminder(
            CreateReminderState::ReceivePayload {
                firing_time,
                recurrence,
            },
        ))
        .await?;

    Ok(())
}

async fn receive_payload(
    bot: Bot,
    dialogue: GlobalDialogue,
    (firing_time, recurrence): (NaiveTime, Recurrence),
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    let Some(payload) = extract_payload(&msg) else {
        bot.send_message(msg.chat.id, "Please send the task as text or a voice note.")
            .await?;
        return Ok(());
    };

    let fire_at = recurrence::upcoming_fire_time(firing_time, scheduler.now());
    let id = scheduler
        .create_reminder(msg.chat.id.0, fire_at, payload, recurrence)
        .await?;

    bot.send_message(
        msg.chat.id,
        format!(
            "Reminder {id} registered for {} ({recurrence}).",
            fire_at.format("%Y-%m-%d %H:%M")
        ),
    )
    .await?;
    dialogue.exit().await?;

    Ok(())
}

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            teloxide::filter_command::<GlobalCommand, _>().branch(
                case![GlobalState::Idle]
                    .branch(case![GlobalCommand::Remind].endpoint(create_reminder_start)),
            ),
        )
        .branch(
            case![GlobalState::CreateReminder(x)]
                .branch(
                    case![CreateReminderState::ReceiveFiringTime].endpoint(receive_firing_time),
                )
                .branch(
                    case![CreateReminderState::ReceiveRecurrence { firing_time }]
                        .endpoint(receive_recurrence),
                )
                .branch(
                    case![CreateReminderState::ReceivePayload {
                        firing_time,
                        recurrence
                    }]
                    .endpoint(receive_payload),
                ),
        )
}
