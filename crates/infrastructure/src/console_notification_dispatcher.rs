//! Console notification dispatcher for development. Logs intents to tracing output.

use async_trait::async_trait;
use dynapp_application::NotificationDispatcher;
use dynapp_core::AppResult;
use dynapp_domain::{ActorRef, NotificationIntent};
use tracing::info;

/// Development dispatcher that logs notification intents to the console.
#[derive(Clone)]
pub struct ConsoleNotificationDispatcher;

impl ConsoleNotificationDispatcher {
    /// Creates a new console dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleNotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn recipient_label(recipient: &ActorRef) -> String {
    match recipient {
        ActorRef::User(id) => format!("user:{id}"),
        ActorRef::Role(id) => format!("role:{id}"),
        ActorRef::Organization(id) => format!("org:{id}"),
    }
}

#[async_trait]
impl NotificationDispatcher for ConsoleNotificationDispatcher {
    async fn dispatch(&self, intent: &NotificationIntent) -> AppResult<()> {
        let recipients = intent
            .recipients
            .iter()
            .map(recipient_label)
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            rule_id = intent.rule_id.as_str(),
            record_id = intent.record_id.as_str(),
            "--- NOTIFICATION (console) ---\nTo: {}\nTitle: {}\n\n{}\n--- END NOTIFICATION ---",
            recipients,
            intent.title,
            intent.message
        );

        Ok(())
    }
}
