use std::sync::Arc;

use chrono::NaiveDate;
use teloxide::dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::scheduling::ReminderScheduler;

use super::{GlobalCommand, GlobalDialogue, GlobalState, HandlerResult};

async fn set_birthday_start(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Please enter the birthday in the format YYYY-MM-DD.",
    )
    .await?;
    dialogue.update(GlobalState::ReceiveBirthday).await?;
    Ok(())
}

async fn receive_birthday(
    bot: Bot,
    dialogue: GlobalDialogue,
    msg: Message,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    match msg
        .text()
        .map(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
    {
        Some(Ok(date)) => {
            scheduler.set_birthday(msg.chat.id.0, date).await;
            bot.send_message(msg.chat.id, format!("Birthday registered as {date}."))
                .await?;
            dialogue.exit().await?;
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                "Could not parse the date. Please use the format YYYY-MM-DD.",
            )
            .await?;
        }
    }
    Ok(())
}

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            teloxide::filter_command::<GlobalCommand, _>().branch(
                case![GlobalState::Idle]
                    .branch(case![GlobalCommand::Birthday].endpoint(set_birthday_start)),
            ),
        )
        .branch(case![GlobalState::ReceiveBirthday].endpoint(receive_birthday))
}
