use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw inbound provider notification, as received at the edge.
///
/// Ephemeral: consumed once the correlator has verified and applied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: String,
    pub payload: String,
    pub signature: String,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(provider: impl Into<String>, payload: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            payload: payload.into(),
            signature: signature.into(),
            received_at: Utc::now(),
        }
    }
}

/// Parsed provider event. Providers identify transfers by their own
/// transfer id; they never know our correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub event_id: String,
    pub transfer_id: String,
    #[serde(flatten)]
    pub kind: ProviderEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEventKind {
    /// Provider accepted the transfer; settlement not yet final.
    Acknowledged,
    /// Settlement confirmed.
    Settled,
    /// Settlement failed after acceptance.
    Failed { reason: String },
}
