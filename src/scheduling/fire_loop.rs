use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::recurrence;
use crate::reminder::{OwnerId, Reminder, ReminderId};
use crate::storage::{ReminderStore, UpdateReminder};

/// Upper bound on a single sleep. Waking at least this often keeps
/// cancellation latency bounded and tolerates clock adjustments.
pub(super) const MAX_WAKE_INTERVAL: Duration = Duration::from_secs(60);

pub(super) type TimerKey = (OwnerId, ReminderId);
pub(super) type TimerMap = HashMap<TimerKey, ScheduledTask>;

/// The live, cancellable task currently armed for one reminder. The
/// scheduler guarantees at most one of these per reminder identity.
pub(super) struct ScheduledTask {
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ScheduledTask {
    pub(super) fn new(task_handle: JoinHandle<()>, cancellation_token: CancellationToken) -> Self {
        Self {
            task_handle,
            cancellation_token,
        }
    }

    /// Signals cancellation without waiting. Safe to call under the timer
    /// registry lock.
    pub(super) fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub(super) async fn join(self, timeout: Duration) {
        let _ = time::timeout(timeout, self.task_handle).await;
    }
}

pub(super) struct FireLoopContext {
    pub(super) reminder: Reminder,
    pub(super) store: Arc<ReminderStore>,
    pub(super) delivery: Arc<dyn DeliveryChannel>,
    pub(super) clock: Arc<dyn Clock>,
    /// The scheduler's timer registry. Not mutated here; its mutex
    /// serializes the advance step against concurrent edit/delete.
    pub(super) timers: Arc<Mutex<TimerMap>>,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum FireOutcome {
    /// One-off reminder delivered; the spawner removes it from the store.
    Finished,
    /// Cancelled by edit, delete or shutdown; the canceller owns cleanup.
    Cancelled,
    /// The reminder vanished from the store mid-advance; nothing left to do.
    Detached,
}

/// One reminder's life: wait in bounded chunks until due, fire, advance via
/// the recurrence engine, re-arm or terminate.
pub(super) async fn run(context: FireLoopContext, token: CancellationToken) -> FireOutcome {
    let FireLoopContext {
        mut reminder,
        store,
        delivery,
        clock,
        timers,
    } = context;

    loop {
        let remaining = reminder.fire_at.signed_duration_since(clock.now());
        if remaining > TimeDelta::zero() {
            let chunk = remaining
                .to_std()
                .map(|duration| duration.min(MAX_WAKE_INTERVAL))
                .unwrap_or(MAX_WAKE_INTERVAL);
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!(
                        "Armed reminder cancelled. [owner_id = {}, reminder_id = {}]",
                        reminder.owner,
                        reminder.id
                    );
                    return FireOutcome::Cancelled;
                }
                _ = time::sleep(chunk) => {}
            }
            continue;
        }

        if token.is_cancelled() {
            return FireOutcome::Cancelled;
        }

        log::info!(
            "Firing reminder. [owner_id = {}, reminder_id = {}, recurrence = {}]",
            reminder.owner,
            reminder.id,
            reminder.recurrence
        );
        if let Err(error) = delivery.deliver(reminder.owner, &reminder.payload).await {
            log::warn!(
                "Reminder delivery failed, advancing anyway. [owner_id = {}, reminder_id = {}, error = {}]",
                reminder.owner,
                reminder.id,
                error
            );
        }

        let Some(next_fire_at) = recurrence::advance(reminder.fire_at, reminder.recurrence) else {
            return FireOutcome::Finished;
        };

        // The registry mutex serializes this write against edit/delete:
        // whoever cancels does so while holding it, so a cancelled loop can
        // never stomp the store with a stale advance.
        let registry = timers.lock().await;
        if token.is_cancelled() {
            return FireOutcome::Cancelled;
        }
        let update = UpdateReminder {
            fire_at: Some(next_fire_at),
            payload: None,
        };
        match store.update(reminder.owner, reminder.id, update).await {
            Ok(updated) => reminder = updated,
            Err(_) => {
                drop(registry);
                log::debug!(
                    "Reminder disappeared during advance. [owner_id = {}, reminder_id = {}]",
                    reminder.owner,
                    reminder.id
                );
                return FireOutcome::Detached;
            }
        }
        drop(registry);
    }
}
