use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{collapse_slots, preprocess_text, IntentExtractor, IntentResult, NluError};
use crate::nats::NatsClient;

#[derive(Debug, Serialize)]
struct SnipsRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SnipsParse {
    intent: Option<SnipsIntent>,
    #[serde(default)]
    slots: Vec<SnipsSlot>,
}

#[derive(Debug, Deserialize)]
struct SnipsIntent {
    #[serde(rename = "intentName")]
    intent_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnipsSlot {
    entity: String,
    value: SnipsSlotValue,
}

#[derive(Debug, Deserialize)]
struct SnipsSlotValue {
    value: Value,
}

/// Snips inference engine reached through NATS request/reply
pub struct SnipsClient {
    client: Arc<NatsClient>,
    subject: String,
    timeout: Duration,
}

impl SnipsClient {
    pub fn new(client: Arc<NatsClient>, subject: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            subject: subject.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl IntentExtractor for SnipsClient {
    async fn extract_intent(&self, text: &str) -> Result<IntentResult, NluError> {
        let text = preprocess_text(text);
        let parsed: SnipsParse = self
            .client
            .request_json(&self.subject, &SnipsRequest { text: &text }, self.timeout)
            .await
            .map_err(|e| NluError::NotReachable(format!("{:#}", e)))?;

        Ok(parsed.into())
    }

    fn name(&self) -> &str {
        "snips"
    }
}

impl From<SnipsParse> for IntentResult {
    fn from(parsed: SnipsParse) -> Self {
        IntentResult {
            intent: parsed.intent.and_then(|i| i.intent_name).unwrap_or_default(),
            slots: collapse_slots(parsed.slots.into_iter().map(|s| (s.entity, s.value.value))),
        }
    }
}
