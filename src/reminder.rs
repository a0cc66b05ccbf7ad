use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;

use crate::error::SchedulerError;

/// Telegram chat id of the user owning a reminder or birthday.
pub type OwnerId = i64;

/// Unique within a single owner only, never globally.
pub type ReminderId = u64;

/// What gets delivered when a reminder fires.
///
/// Voice carries an opaque transport media reference (a Telegram file id);
/// the core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderPayload {
    Text(String),
    Voice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    OneOff,
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Recurrence {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "once" | "one-off" | "oneoff" => Ok(Self::OneOff),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(SchedulerError::InvalidRecurrence(other.to_string())),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OneOff => "once",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: ReminderId,
    pub owner: OwnerId,
    pub fire_at: DateTime<Tz>,
    pub payload: ReminderPayload,
    pub recurrence: Recurrence,
}

/// At most one per owner. The full date is kept, but only month and day
/// drive the yearly sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Birthday {
    date: NaiveDate,
}

impl Birthday {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Whether the birthday falls on `today`. A February 29th birthday only
    /// matches in leap years.
    pub fn matches(&self, today: NaiveDate) -> bool {
        self.date.month() == today.month() && self.date.day() == today.day()
    }
}
