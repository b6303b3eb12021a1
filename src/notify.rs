use async_trait::async_trait;
use thiserror::Error;

const LOGSNAG_API_URL: &str = "https://api.logsnag.com/v1/log";
const LOGSNAG_PROJECT: &str = "crypto-dca";
const LOGSNAG_CHANNEL: &str = "trading";

/// What gets announced after a successful purchase. Amounts are already
/// formatted for display.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseEvent {
    pub currency: String,
    pub amount: String,
    pub rate: String,
}

/// Never escalates into `error::Error`; the caller logs and discards it.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification endpoint returned status {0}")]
    Status(u16),
}

/// Best-effort publish of a purchased event.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish_purchased(&self, event: &PurchaseEvent) -> Result<(), NotificationError>;
}

pub struct LogSnag {
    http: reqwest::Client,
    token: String,
}

impl LogSnag {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for LogSnag {
    async fn publish_purchased(&self, event: &PurchaseEvent) -> Result<(), NotificationError> {
        let body = serde_json::json!({
            "project": LOGSNAG_PROJECT,
            "channel": LOGSNAG_CHANNEL,
            "event": format!("{} Purchased", event.currency),
            "description": format!("{} at €{}", event.amount, event.rate),
            "icon": "💸",
            "tags": { "currency": event.currency },
            "notify": true,
        });

        let response = self
            .http
            .post(LOGSNAG_API_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}
