use thiserror::Error;

use crate::reminder::{OwnerId, ReminderId};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Reminder not found [owner_id = {owner}, reminder_id = {id}]")]
    NotFound { owner: OwnerId, id: ReminderId },

    #[error("Unknown recurrence \"{0}\", expected one of: none, daily, weekly, monthly")]
    InvalidRecurrence(String),
}
