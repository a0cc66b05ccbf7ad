use chrono::{DateTime, Days, LocalResult, Months, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

use crate::reminder::Recurrence;

/// Computes the next occurrence after a fire, or `None` when the reminder is
/// one-off and should terminate.
///
/// Advancement is calendar-based in the reminder's timezone, so a daily
/// reminder stays on the same wall-clock time across DST transitions.
/// Monthly advancement clamps the day of month to the last valid day of the
/// target month (Jan 31 -> Feb 28, or Feb 29 in leap years).
pub fn advance(fire_at: DateTime<Tz>, recurrence: Recurrence) -> Option<DateTime<Tz>> {
    let local = fire_at.naive_local();
    let next = match recurrence {
        Recurrence::OneOff => return None,
        Recurrence::Daily => local.checked_add_days(Days::new(1)),
        Recurrence::Weekly => local.checked_add_days(Days::new(7)),
        Recurrence::Monthly => local.checked_add_months(Months::new(1)),
    }
    .expect("calendar overflow takes ~quarter of a million years");

    Some(resolve_local(next, fire_at.timezone()))
}

/// Maps a wall-clock time to its next occurrence: today if still ahead of
/// `now`, otherwise tomorrow. Used by the chat layer when a user supplies a
/// bare HH:MM.
pub fn upcoming_fire_time(at: NaiveTime, now: DateTime<Tz>) -> DateTime<Tz> {
    let date = if at <= now.time() {
        now.date_naive()
            .succ_opt()
            .expect("calendar overflow takes ~quarter of a million years")
    } else {
        now.date_naive()
    };

    resolve_local(date.and_time(at), now.timezone())
}

/// Pins a naive local datetime to the timezone. An ambiguous local time
/// (clocks rolled back) resolves to the earlier instant; a nonexistent one
/// (clocks rolled forward) shifts ahead to the first representable time.
fn resolve_local(local: NaiveDateTime, timezone: Tz) -> DateTime<Tz> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let mut shifted = local;
            loop {
                shifted += TimeDelta::minutes(30);
                if let Some(instant) = timezone.from_local_datetime(&shifted).earliest() {
                    return instant;
                }
            }
        }
    }
}
