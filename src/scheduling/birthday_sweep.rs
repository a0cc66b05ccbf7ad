use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::reminder::ReminderPayload;
use crate::storage::ReminderStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(86_400);

const BIRTHDAY_GREETING: &str = "It's a birthday today, don't forget to send your wishes! 🎉";

/// Spawns the process-wide daily pass over registered birthdays. Unlike task
/// reminders there is no per-birthday timer; one task serves everyone.
/// A day missed while the process is down stays missed.
pub(super) fn spawn(
    store: Arc<ReminderStore>,
    delivery: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let today = clock.now().date_naive();
            for (owner, birthday) in store.birthdays().await {
                if !birthday.matches(today) {
                    continue;
                }
                log::info!("Birthday match, sending greeting. [owner_id = {owner}]");
                let payload = ReminderPayload::Text(BIRTHDAY_GREETING.to_string());
                if let Err(error) = delivery.deliver(owner, &payload).await {
                    log::warn!(
                        "Birthday greeting delivery failed. [owner_id = {owner}, error = {error}]"
                    );
                }
            }

            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("Birthday sweep stopped.");
                    return;
                }
                _ = time::sleep(SWEEP_INTERVAL) => {}
            }
        }
    })
}
