use chrono::DateTime;
use chrono_tz::Tz;

use crate::reminder::{OwnerId, Recurrence, ReminderPayload};

pub struct NewReminder {
    pub owner: OwnerId,
    pub fire_at: DateTime<Tz>,
    pub payload: ReminderPayload,
    pub recurrence: Recurrence,
}

/// Partial update; recurrence is fixed at creation and deliberately absent.
#[derive(Default)]
pub struct UpdateReminder {
    pub fire_at: Option<DateTime<Tz>>,
    pub payload: Option<ReminderPayload>,
}
