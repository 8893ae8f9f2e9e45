use async_trait::async_trait;
use dynapp_core::AppResult;
use dynapp_domain::NotificationIntent;

/// Delivery port consuming rendered notification intents.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Hands one intent to the delivery transport.
    async fn dispatch(&self, intent: &NotificationIntent) -> AppResult<()>;
}
