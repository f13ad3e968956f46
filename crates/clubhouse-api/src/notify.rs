use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationMessage {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub event_title: String,
    pub kind: &'static str,
}

impl ConfirmationMessage {
    pub fn registration_confirmed(user_id: Uuid, event_id: Uuid, event_title: &str) -> Self {
        Self {
            user_id,
            event_id,
            event_title: event_title.to_string(),
            kind: "registration_confirmed",
        }
    }
}

/// Client for the external notification dispatch function.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client, url }
    }

    /// Notifier that only logs; used when no dispatch URL is configured.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn send_confirmation(&self, message: &ConfirmationMessage) -> anyhow::Result<()> {
        let Some(url) = &self.url else {
            debug!(
                "Notification dispatch disabled, skipping {} for {}",
                message.kind, message.user_id
            );
            return Ok(());
        };

        self.client
            .post(url)
            .json(message)
            .send()
            .await?
            .error_for_status()?;

        info!("Sent {} to {} for event {}", message.kind, message.user_id, message.event_id);
        Ok(())
    }

    /// Fire-and-forget. A failed notification never affects the registration.
    pub fn dispatch_confirmation(&self, message: ConfirmationMessage) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_confirmation(&message).await {
                warn!(
                    "Confirmation for {} on event {} failed: {}",
                    message.user_id, message.event_id, e
                );
            }
        });
    }
}
