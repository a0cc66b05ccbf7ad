use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::error::SchedulerError;
use crate::reminder::{OwnerId, Recurrence, Reminder, ReminderId, ReminderPayload};
use crate::storage::{NewReminder, ReminderStore, UpdateReminder};

use super::birthday_sweep;
use super::fire_loop::{self, FireLoopContext, FireOutcome, ScheduledTask, TimerMap};

const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Facade the chat layer talks to. Owns the timer registry and with it the
/// invariant that every reminder identity has at most one live timer task.
///
/// Lock order is registry -> store, everywhere. Cancellation is signalled
/// under the registry lock; joining a cancelled task happens after the lock
/// is released.
pub struct ReminderScheduler {
    store: Arc<ReminderStore>,
    delivery: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    timers: Arc<Mutex<TimerMap>>,
    shutdown_token: CancellationToken,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<ReminderStore>,
        delivery: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            delivery,
            clock,
            timers: Arc::new(Mutex::new(HashMap::new())),
            shutdown_token: CancellationToken::new(),
            sweep_handle: Mutex::new(None),
        }
    }

    /// Current time in the configured timezone, for collaborators that need
    /// to turn wall-clock input into an instant.
    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now()
    }

    pub async fn create_reminder(
        &self,
        owner: OwnerId,
        fire_at: DateTime<Tz>,
        payload: ReminderPayload,
        recurrence: Recurrence,
    ) -> Result<ReminderId, SchedulerError> {
        let mut timers = self.timers.lock().await;
        let reminder = self
            .store
            .insert(NewReminder {
                owner,
                fire_at,
                payload,
                recurrence,
            })
            .await;

        let task = self.spawn_fire_loop(&reminder);
        timers.insert((owner, reminder.id), task);

        log::info!(
            "Scheduled reminder. [owner_id = {owner}, reminder_id = {}, fire_at = {}, recurrence = {}]",
            reminder.id,
            reminder.fire_at,
            reminder.recurrence
        );
        Ok(reminder.id)
    }

    /// Applies a partial update and re-arms the reminder. The old timer is
    /// cancelled before the fresh one is registered, so repeated edits leave
    /// exactly one live timer. Recurrence is fixed at creation and cannot be
    /// changed here.
    pub async fn edit_reminder(
        &self,
        owner: OwnerId,
        id: ReminderId,
        new_fire_at: Option<DateTime<Tz>>,
        new_payload: Option<ReminderPayload>,
    ) -> Result<(), SchedulerError> {
        let mut timers = self.timers.lock().await;
        let previous = timers.remove(&(owner, id));
        if let Some(task) = &previous {
            task.cancel();
        }

        let updated = match self
            .store
            .update(
                owner,
                id,
                UpdateReminder {
                    fire_at: new_fire_at,
                    payload: new_payload,
                },
            )
            .await
        {
            Ok(reminder) => reminder,
            Err(error) => {
                drop(timers);
                if let Some(task) = previous {
                    task.join(CANCEL_TIMEOUT).await;
                }
                return Err(error);
            }
        };

        let task = self.spawn_fire_loop(&updated);
        timers.insert((owner, id), task);
        drop(timers);

        if let Some(task) = previous {
            task.join(CANCEL_TIMEOUT).await;
        }

        log::info!(
            "Updated reminder. [owner_id = {owner}, reminder_id = {id}, fire_at = {}]",
            updated.fire_at
        );
        Ok(())
    }

    pub async fn delete_reminder(
        &self,
        owner: OwnerId,
        id: ReminderId,
    ) -> Result<(), SchedulerError> {
        let mut timers = self.timers.lock().await;
        self.store.remove(owner, id).await?;

        let task = timers.remove(&(owner, id));
        if let Some(task) = &task {
            task.cancel();
        }
        drop(timers);

        if let Some(task) = task {
            task.join(CANCEL_TIMEOUT).await;
        }

        log::info!("Deleted reminder. [owner_id = {owner}, reminder_id = {id}]");
        Ok(())
    }

    pub async fn get_reminder(
        &self,
        owner: OwnerId,
        id: ReminderId,
    ) -> Result<Reminder, SchedulerError> {
        self.store.get(owner, id).await
    }

    pub async fn list_reminders(&self, owner: OwnerId) -> Vec<Reminder> {
        self.store.list(owner).await
    }

    pub async fn set_birthday(&self, owner: OwnerId, date: chrono::NaiveDate) {
        self.store.set_birthday(owner, date).await;
        log::info!("Registered birthday. [owner_id = {owner}, date = {date}]");
    }

    /// Starts the process-wide daily birthday pass. Idempotent in effect:
    /// calling it again replaces the handle but the old task keeps running
    /// until shutdown, so call it once.
    pub async fn spawn_birthday_sweep(&self) {
        let handle = birthday_sweep::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.delivery),
            Arc::clone(&self.clock),
            self.shutdown_token.child_token(),
        );
        *self.sweep_handle.lock().await = Some(handle);
    }

    /// Cancels every live timer and the birthday sweep, then waits for them
    /// with a bounded timeout. In-flight deliveries may still complete;
    /// nothing re-arms afterwards.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        let drained: Vec<ScheduledTask> = {
            let mut timers = self.timers.lock().await;
            timers.drain().map(|(_, task)| task).collect()
        };
        for task in drained {
            task.join(CANCEL_TIMEOUT).await;
        }

        if let Some(handle) = self.sweep_handle.lock().await.take() {
            let _ = time::timeout(CANCEL_TIMEOUT, handle).await;
        }

        log::info!("Scheduler shut down.");
    }

    /// Must be called with the timer registry locked by the caller.
    fn spawn_fire_loop(&self, reminder: &Reminder) -> ScheduledTask {
        let token = self.shutdown_token.child_token();
        let context = FireLoopContext {
            reminder: reminder.clone(),
            store: Arc::clone(&self.store),
            delivery: Arc::clone(&self.delivery),
            clock: Arc::clone(&self.clock),
            timers: Arc::clone(&self.timers),
        };

        let key = (reminder.owner, reminder.id);
        let store = Arc::clone(&self.store);
        let timers = Arc::clone(&self.timers);
        let loop_token = token.clone();
        let task_handle = tokio::spawn(async move {
            let outcome = fire_loop::run(context, loop_token.clone()).await;
            if outcome != FireOutcome::Finished {
                return;
            }

            // One-off reminder delivered: release the timer slot and drop
            // the record so listings never show an already-fired entry. If
            // an edit or delete won the registry lock first, it owns both.
            let mut timers = timers.lock().await;
            if loop_token.is_cancelled() {
                return;
            }
            timers.remove(&key);
            if let Err(error) = store.remove(key.0, key.1).await {
                log::debug!("Fired reminder was already gone. [error = {error}]");
            }
        });

        ScheduledTask::new(task_handle, token)
    }

    #[cfg(test)]
    pub(crate) async fn active_timer_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta, TimeZone};
    use chrono_tz::Asia::Tehran;

    use crate::test_support::{MockClock, RecordingDeliveryChannel};

    use super::*;

    fn scheduler_at(
        start: DateTime<Tz>,
    ) -> (Arc<ReminderScheduler>, Arc<RecordingDeliveryChannel>) {
        let store = Arc::new(ReminderStore::new());
        let delivery = Arc::new(RecordingDeliveryChannel::default());
        let clock = Arc::new(MockClock::new(start));
        let scheduler = Arc::new(ReminderScheduler::new(store, delivery.clone(), clock));
        (scheduler, delivery)
    }

    fn start_instant() -> DateTime<Tz> {
        Tehran.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn text(payload: &str) -> ReminderPayload {
        ReminderPayload::Text(payload.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn daily_reminder_fires_once_and_advances_a_day() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        let id = scheduler
            .create_reminder(7, start + TimeDelta::seconds(2), text("wake up"), Recurrence::Daily)
            .await
            .unwrap();

        time::sleep(Duration::from_secs(3)).await;

        assert_eq!(delivery.deliveries(), vec![(7, text("wake up"))]);
        let stored = scheduler.list_reminders(7).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].fire_at,
            start + TimeDelta::seconds(2) + TimeDelta::days(1)
        );
        assert_eq!(stored[0].id, id);

        // Well past the fire but far short of the next occurrence: the
        // bounded wakes must not produce a duplicate fire.
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(delivery.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_off_reminder_fires_once_then_terminates_and_is_removed() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        scheduler
            .create_reminder(7, start + TimeDelta::seconds(1), text("once"), Recurrence::OneOff)
            .await
            .unwrap();

        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(delivery.deliveries().len(), 1);
        assert!(scheduler.list_reminders(7).await.is_empty());
        assert_eq!(scheduler.active_timer_count().await, 0);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(delivery.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_reminder_never_fires() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        let id = scheduler
            .create_reminder(7, start + TimeDelta::seconds(5), text("doomed"), Recurrence::Daily)
            .await
            .unwrap();
        scheduler.delete_reminder(7, id).await.unwrap();

        time::sleep(Duration::from_secs(600)).await;

        assert!(delivery.deliveries().is_empty());
        assert_eq!(scheduler.active_timer_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_not_found_for_missing_and_repeated_ids() {
        let start = start_instant();
        let (scheduler, _) = scheduler_at(start);

        let missing = scheduler.delete_reminder(7, 99).await.unwrap_err();
        assert!(matches!(missing, SchedulerError::NotFound { .. }));

        let id = scheduler
            .create_reminder(7, start + TimeDelta::hours(1), text("x"), Recurrence::OneOff)
            .await
            .unwrap();
        scheduler.delete_reminder(7, id).await.unwrap();
        let second = scheduler.delete_reminder(7, id).await.unwrap_err();
        assert!(matches!(second, SchedulerError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_edits_keep_exactly_one_timer_and_fire_at_the_new_time() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        let id = scheduler
            .create_reminder(7, start + TimeDelta::hours(1), text("v1"), Recurrence::OneOff)
            .await
            .unwrap();

        for minutes in [50, 40, 30] {
            scheduler
                .edit_reminder(
                    7,
                    id,
                    Some(start + TimeDelta::minutes(minutes)),
                    Some(text(&format!("v{minutes}"))),
                )
                .await
                .unwrap();
            assert_eq!(scheduler.active_timer_count().await, 1);
        }

        time::sleep(Duration::from_secs(31 * 60)).await;

        assert_eq!(delivery.deliveries(), vec![(7, text("v30"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_missing_reminder_is_not_found() {
        let (scheduler, _) = scheduler_at(start_instant());

        let error = scheduler
            .edit_reminder(7, 4, None, Some(text("nope")))
            .await
            .unwrap_err();

        assert!(matches!(error, SchedulerError::NotFound { owner: 7, id: 4 }));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_failure_still_advances_the_schedule() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);
        delivery.set_failing(true);

        scheduler
            .create_reminder(7, start + TimeDelta::seconds(1), text("flaky"), Recurrence::Daily)
            .await
            .unwrap();

        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(delivery.deliveries().len(), 1);
        let stored = scheduler.list_reminders(7).await;
        assert_eq!(
            stored[0].fire_at,
            start + TimeDelta::seconds(1) + TimeDelta::days(1)
        );
        assert_eq!(scheduler.active_timer_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_edit_and_delete_leave_a_consistent_state() {
        let start = start_instant();
        let (scheduler, _) = scheduler_at(start);

        let id = scheduler
            .create_reminder(7, start + TimeDelta::hours(1), text("contended"), Recurrence::Daily)
            .await
            .unwrap();

        let edit = scheduler.edit_reminder(7, id, Some(start + TimeDelta::hours(2)), None);
        let delete = scheduler.delete_reminder(7, id);
        let (edit_result, delete_result) = tokio::join!(edit, delete);

        // Whichever order the registry lock imposed, the store and the
        // timer registry must agree afterwards.
        let stored = scheduler.list_reminders(7).await;
        let timers = scheduler.active_timer_count().await;
        match (edit_result, delete_result) {
            // Delete won the lock first: the edit saw NotFound.
            (Err(SchedulerError::NotFound { .. }), Ok(())) => {
                assert!(stored.is_empty());
                assert_eq!(timers, 0);
            }
            // Edit re-armed first, then delete removed the fresh timer.
            (Ok(()), Ok(())) => {
                assert!(stored.is_empty());
                assert_eq!(timers, 0);
            }
            (edit_result, delete_result) => {
                panic!("unexpected outcome: edit = {edit_result:?}, delete = {delete_result:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn birthday_sweep_greets_matching_owner_exactly_once() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        scheduler
            .set_birthday(7, NaiveDate::from_ymd_opt(1990, 6, 1).unwrap())
            .await;
        scheduler
            .set_birthday(8, NaiveDate::from_ymd_opt(1985, 12, 24).unwrap())
            .await;
        scheduler.spawn_birthday_sweep().await;

        time::sleep(Duration::from_secs(1)).await;

        let greetings = delivery.deliveries();
        assert_eq!(greetings.len(), 1);
        assert_eq!(greetings[0].0, 7);
        assert!(matches!(&greetings[0].1, ReminderPayload::Text(_)));

        // Two further daily passes land on June 2nd and 3rd; no repeats.
        time::sleep(Duration::from_secs(2 * 86_400)).await;
        assert_eq!(delivery.deliveries().len(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_armed_timers_and_the_sweep() {
        let start = start_instant();
        let (scheduler, delivery) = scheduler_at(start);

        scheduler
            .create_reminder(7, start + TimeDelta::seconds(30), text("late"), Recurrence::Daily)
            .await
            .unwrap();
        scheduler.spawn_birthday_sweep().await;

        scheduler.shutdown().await;
        time::sleep(Duration::from_secs(600)).await;

        assert!(delivery.deliveries().is_empty());
        assert_eq!(scheduler.active_timer_count().await, 0);
    }
}
