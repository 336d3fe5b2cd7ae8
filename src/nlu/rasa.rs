use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{collapse_slots, preprocess_text, IntentExtractor, IntentResult, NluError};

#[derive(Debug, Deserialize)]
struct RasaParse {
    intent: Option<RasaIntent>,
    #[serde(default)]
    entities: Vec<RasaEntity>,
}

#[derive(Debug, Deserialize)]
struct RasaIntent {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RasaEntity {
    entity: String,
    value: Value,
}

/// Client for a Rasa NLU server's `/model/parse` endpoint
#[derive(Clone)]
pub struct RasaClient {
    base_url: String,
    client: Client,
}

impl RasaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NluError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NluError::Api(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Check if the server answers its status endpoint
    pub async fn is_running(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait::async_trait]
impl IntentExtractor for RasaClient {
    async fn extract_intent(&self, text: &str) -> Result<IntentResult, NluError> {
        let url = format!("{}/model/parse", self.base_url);
        let body = serde_json::json!({ "text": preprocess_text(text) });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|_| NluError::NotReachable(self.base_url.clone()))?;

        if !resp.status().is_success() {
            return Err(NluError::Api(format!("Rasa returned {}", resp.status())));
        }

        let parsed: RasaParse = resp
            .json()
            .await
            .map_err(|e| NluError::Parse(e.to_string()))?;

        debug!("Rasa parse result: {:?}", parsed);

        Ok(parsed.into())
    }

    fn name(&self) -> &str {
        "rasa"
    }
}

impl From<RasaParse> for IntentResult {
    fn from(parsed: RasaParse) -> Self {
        IntentResult {
            intent: parsed.intent.and_then(|i| i.name).unwrap_or_default(),
            slots: collapse_slots(parsed.entities.into_iter().map(|e| (e.entity, e.value))),
        }
    }
}
