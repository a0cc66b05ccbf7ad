use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::error::SchedulerError;
use crate::reminder::{Birthday, OwnerId, Reminder, ReminderId};

use super::{NewReminder, UpdateReminder};

#[derive(Default)]
struct OwnerReminders {
    // Ids are handed out from this counter and never reused, so a delete
    // followed by a create cannot collide with a still-armed timer.
    next_id: ReminderId,
    reminders: BTreeMap<ReminderId, Reminder>,
}

#[derive(Default)]
struct StoreState {
    owners: HashMap<OwnerId, OwnerReminders>,
    birthdays: HashMap<OwnerId, Birthday>,
}

/// In-memory store for all reminders and birthdays. The sole owner of
/// reminder records; collaborators hold only `(OwnerId, ReminderId)` pairs
/// and cloned snapshots.
pub struct ReminderStore {
    state: RwLock<StoreState>,
}

impl ReminderStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    pub async fn insert(&self, new_reminder: NewReminder) -> Reminder {
        let mut state = self.state.write().await;
        let owner_reminders = state.owners.entry(new_reminder.owner).or_default();

        owner_reminders.next_id += 1;
        let reminder = Reminder {
            id: owner_reminders.next_id,
            owner: new_reminder.owner,
            fire_at: new_reminder.fire_at,
            payload: new_reminder.payload,
            recurrence: new_reminder.recurrence,
        };
        owner_reminders.reminders.insert(reminder.id, reminder.clone());

        reminder
    }

    pub async fn get(&self, owner: OwnerId, id: ReminderId) -> Result<Reminder, SchedulerError> {
        let state = self.state.read().await;
        state
            .owners
            .get(&owner)
            .and_then(|owner_reminders| owner_reminders.reminders.get(&id))
            .cloned()
            .ok_or(SchedulerError::NotFound { owner, id })
    }

    pub async fn update(
        &self,
        owner: OwnerId,
        id: ReminderId,
        update: UpdateReminder,
    ) -> Result<Reminder, SchedulerError> {
        let mut state = self.state.write().await;
        let reminder = state
            .owners
            .get_mut(&owner)
            .and_then(|owner_reminders| owner_reminders.reminders.get_mut(&id))
            .ok_or(SchedulerError::NotFound { owner, id })?;

        reminder.fire_at = update.fire_at.unwrap_or(reminder.fire_at);
        if let Some(payload) = update.payload {
            reminder.payload = payload;
        }

        Ok(reminder.clone())
    }

    pub async fn remove(&self, owner: OwnerId, id: ReminderId) -> Result<Reminder, SchedulerError> {
        let mut state = self.state.write().await;
        state
            .owners
            .get_mut(&owner)
            .and_then(|owner_reminders| owner_reminders.reminders.remove(&id))
            .ok_or(SchedulerError::NotFound { owner, id })
    }

    /// All reminders of one owner in insertion order.
    pub async fn list(&self, owner: OwnerId) -> Vec<Reminder> {
        let state = self.state.read().await;
        state
            .owners
            .get(&owner)
            .map(|owner_reminders| owner_reminders.reminders.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Idempotent upsert; any previously registered birthday is replaced.
    pub async fn set_birthday(&self, owner: OwnerId, date: NaiveDate) {
        let mut state = self.state.write().await;
        state.birthdays.insert(owner, Birthday::new(date));
    }

    pub async fn birthdays(&self) -> Vec<(OwnerId, Birthday)> {
        let state = self.state.read().await;
        state
            .birthdays
            .iter()
            .map(|(owner, birthday)| (*owner, *birthday))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Asia::Tehran;

    use crate::reminder::{Recurrence, ReminderPayload};

    use super::*;

    fn new_reminder(owner: OwnerId, text: &str) -> NewReminder {
        NewReminder {
            owner,
            fire_at: Tehran.with_ymd_and_hms(2025, 6, 1, 16, 23, 0).unwrap(),
            payload: ReminderPayload::Text(text.to_string()),
            recurrence: Recurrence::Daily,
        }
    }

    #[tokio::test]
    async fn insert_allocates_sequential_ids_per_owner() {
        let store = ReminderStore::new();

        let first = store.insert(new_reminder(1, "a")).await;
        let second = store.insert(new_reminder(1, "b")).await;
        let other_owner = store.insert(new_reminder(2, "c")).await;

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(other_owner.id, 1);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_deletion() {
        let store = ReminderStore::new();

        let first = store.insert(new_reminder(1, "a")).await;
        let second = store.insert(new_reminder(1, "b")).await;
        store.remove(1, first.id).await.unwrap();
        store.remove(1, second.id).await.unwrap();

        let third = store.insert(new_reminder(1, "c")).await;

        assert_eq!(third.id, 3);
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let store = ReminderStore::new();
        let created = store.insert(new_reminder(1, "original")).await;
        let new_fire_at = Tehran.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

        let updated = store
            .update(
                1,
                created.id,
                UpdateReminder {
                    fire_at: Some(new_fire_at),
                    payload: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.fire_at, new_fire_at);
        assert_eq!(updated.payload, ReminderPayload::Text("original".to_string()));
        assert_eq!(updated.recurrence, Recurrence::Daily);
    }

    #[tokio::test]
    async fn update_missing_reminder_fails_with_not_found() {
        let store = ReminderStore::new();

        let error = store.update(1, 42, UpdateReminder::default()).await.unwrap_err();

        assert!(matches!(
            error,
            SchedulerError::NotFound { owner: 1, id: 42 }
        ));
    }

    #[tokio::test]
    async fn remove_twice_fails_the_second_time() {
        let store = ReminderStore::new();
        let created = store.insert(new_reminder(1, "a")).await;

        store.remove(1, created.id).await.unwrap();
        let error = store.remove(1, created.id).await.unwrap_err();

        assert!(matches!(error, SchedulerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_returns_insertion_order_and_is_scoped_to_owner() {
        let store = ReminderStore::new();
        store.insert(new_reminder(1, "first")).await;
        store.insert(new_reminder(1, "second")).await;
        store.insert(new_reminder(1, "third")).await;
        store.insert(new_reminder(2, "other")).await;

        let listed = store.list(1).await;

        let texts: Vec<_> = listed
            .iter()
            .map(|reminder| match &reminder.payload {
                ReminderPayload::Text(text) => text.as_str(),
                ReminderPayload::Voice(_) => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(store.list(3).await.is_empty());
    }

    #[tokio::test]
    async fn set_birthday_replaces_previous_entry() {
        let store = ReminderStore::new();

        store
            .set_birthday(1, NaiveDate::from_ymd_opt(1990, 3, 10).unwrap())
            .await;
        store
            .set_birthday(1, NaiveDate::from_ymd_opt(1991, 4, 11).unwrap())
            .await;

        let birthdays = store.birthdays().await;
        assert_eq!(birthdays.len(), 1);
        assert_eq!(
            birthdays[0].1.date(),
            NaiveDate::from_ymd_opt(1991, 4, 11).unwrap()
        );
    }
}
