use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::reminder::{OwnerId, ReminderPayload};

/// Clock anchored at a fixed instant and advanced by tokio's (possibly
/// paused) time, so `start_paused` tests control it via `tokio::time::sleep`.
pub(crate) struct MockClock {
    start: DateTime<Tz>,
    base: Instant,
}

impl MockClock {
    pub(crate) fn new(start: DateTime<Tz>) -> Self {
        Self {
            start,
            base: Instant::now(),
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Tz> {
        let elapsed = TimeDelta::from_std(self.base.elapsed()).expect("elapsed time fits");
        self.start + elapsed
    }
}

/// Records every delivery attempt; can be switched to fail them all, which
/// still counts as an attempt.
#[derive(Default)]
pub(crate) struct RecordingDeliveryChannel {
    deliveries: Mutex<Vec<(OwnerId, ReminderPayload)>>,
    failing: AtomicBool,
}

impl RecordingDeliveryChannel {
    pub(crate) fn deliveries(&self) -> Vec<(OwnerId, ReminderPayload)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDeliveryChannel {
    async fn deliver(&self, owner: OwnerId, payload: &ReminderPayload) -> anyhow::Result<()> {
        self.deliveries.lock().unwrap().push((owner, payload.clone()));
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("synthetic delivery failure");
        }
        Ok(())
    }
}
