use async_trait::async_trait;

use crate::reminder::{OwnerId, ReminderPayload};

/// Outbound seam towards the chat transport. The scheduler treats delivery
/// as best-effort: a failure is logged by the caller and never stops
/// recurrence advancement.
#[async_trait]
pub trait DeliveryChannel: Send + Sync + 'static {
    async fn deliver(&self, owner: OwnerId, payload: &ReminderPayload) -> anyhow::Result<()>;
}
