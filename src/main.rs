mod appsettings;
mod clock;
mod delivery;
mod error;
mod recurrence;
mod reminder;
mod scheduling;
mod storage;
mod telegram;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use chrono_tz::Tz;
use teloxide::Bot;

use clock::{Clock, TzClock};
use delivery::DeliveryChannel;
use scheduling::ReminderScheduler;
use storage::ReminderStore;
use telegram::{TelegramDeliveryChannel, TelegramInteractionInterface};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = appsettings::get();
    let timezone: Tz = settings
        .timezone
        .parse()
        .ok()
        .with_context(|| format!("Invalid timezone in settings: {}", settings.timezone))?;

    let bot = Bot::new(settings.telegram.token.clone());
    let store = Arc::new(ReminderStore::new());
    let clock: Arc<dyn Clock> = Arc::new(TzClock::new(timezone));
    let delivery: Arc<dyn DeliveryChannel> = Arc::new(TelegramDeliveryChannel::new(bot.clone()));
    let scheduler = Arc::new(ReminderScheduler::new(store, delivery, clock));

    scheduler.spawn_birthday_sweep().await;
    log::info!("Starting reminder bot. [timezone = {timezone}]");

    TelegramInteractionInterface::start(bot, Arc::clone(&scheduler)).await;

    scheduler.shutdown().await;
    Ok(())
}
