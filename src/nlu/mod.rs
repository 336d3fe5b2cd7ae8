//! NLU collaborators
//!
//! Two interchangeable engines extract an intent and its slots from text:
//! - `rasa`: Rasa server over HTTP
//! - `snips`: Snips inference service over NATS request/reply

mod rasa;
mod snips;

pub use rasa::RasaClient;
pub use snips::SnipsClient;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::mapper::IntentSlot;

#[derive(Debug, thiserror::Error)]
pub enum NluError {
    #[error("NLU engine not reachable: {0}")]
    NotReachable(String),

    #[error("NLU engine error: {0}")]
    Api(String),

    #[error("Failed to parse NLU response: {0}")]
    Parse(String),
}

/// Engine selector carried by recognition requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NluModel {
    Snips,
    Rasa,
}

impl FromStr for NluModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snips" => Ok(NluModel::Snips),
            "rasa" => Ok(NluModel::Rasa),
            other => Err(format!("unsupported NLU model '{}'", other)),
        }
    }
}

impl fmt::Display for NluModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NluModel::Snips => f.write_str("snips"),
            NluModel::Rasa => f.write_str("rasa"),
        }
    }
}

/// Intent and slots extracted from one utterance. An empty intent name
/// means the utterance was not understood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub slots: Vec<IntentSlot>,
}

#[async_trait::async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract_intent(&self, text: &str) -> Result<IntentResult, NluError>;

    fn name(&self) -> &str;
}

/// The engines available to a running service
#[derive(Clone, Default)]
pub struct NluEngines {
    snips: Option<Arc<dyn IntentExtractor>>,
    rasa: Option<Arc<dyn IntentExtractor>>,
}

impl NluEngines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snips(mut self, engine: Arc<dyn IntentExtractor>) -> Self {
        self.snips = Some(engine);
        self
    }

    pub fn with_rasa(mut self, engine: Arc<dyn IntentExtractor>) -> Self {
        self.rasa = Some(engine);
        self
    }

    pub fn get(&self, model: NluModel) -> Option<&Arc<dyn IntentExtractor>> {
        match model {
            NluModel::Snips => self.snips.as_ref(),
            NluModel::Rasa => self.rasa.as_ref(),
        }
    }
}

/// Lowercase, trim, and strip punctuation before handing text to an engine
pub fn preprocess_text(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Collapse (entity, value) pairs into slots. A repeated entity keeps its
/// first position and takes the later value.
pub(crate) fn collapse_slots<I>(pairs: I) -> Vec<IntentSlot>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut slots: Vec<IntentSlot> = Vec::new();

    for (name, value) in pairs {
        let value = value_text(value);
        match slots.iter_mut().find(|slot| slot.name == name) {
            Some(slot) => slot.value = value,
            None => slots.push(IntentSlot { name, value }),
        }
    }

    slots
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
