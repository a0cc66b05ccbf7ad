mod model;
mod reminder_store;

pub use model::{NewReminder, UpdateReminder};
pub use reminder_store::ReminderStore;
