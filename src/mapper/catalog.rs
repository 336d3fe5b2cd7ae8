use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const REQUIRED_SIGNAL_KEYS: [&str; 6] = [
    "default_value",
    "default_change_factor",
    "actions",
    "values",
    "default_fallback",
    "value_set_intents",
];

const REQUIRED_VALUE_KEYS: [&str; 5] = ["ranged", "start", "end", "ignore", "additional"];

/// Errors raised while loading the signal catalog. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing top-level '{0}' object")]
    MissingSection(&'static str),

    #[error("{signal}: Missing required keys in signal data: {keys:?}")]
    MissingKeys { signal: String, keys: Vec<&'static str> },

    #[error("{signal}: Invalid 'actions' key in signal data. Must be an object with at least one action")]
    InvalidActions { signal: String },

    #[error("{signal}: Invalid action '{action}'. Allowed actions: ['set', 'increase', 'decrease']")]
    UnknownAction { signal: String, action: String },

    #[error("{signal}: Invalid 'synonyms' value for action '{action}'. Must be a list of strings")]
    InvalidSynonyms { signal: String, action: String },

    #[error("{signal}: Invalid 'values' key in signal data. Required keys: ['ranged', 'start', 'end', 'ignore', 'additional']")]
    InvalidValues { signal: String },

    #[error("{signal}: Invalid '{field}' value in signal data. Allowed values: [true, false]")]
    NotBoolean { signal: String, field: &'static str },

    #[error("{signal}: Ranged signal needs numeric start <= end")]
    InvalidRange { signal: String },

    #[error("{signal}: Malformed signal data: {source}")]
    Malformed {
        signal: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Intent '{intent}': Malformed intent entry: {source}")]
    MalformedIntent {
        intent: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Action a voice command can request on a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Set,
    Increase,
    Decrease,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Set => "set",
            ActionKind::Increase => "increase",
            ActionKind::Decrease => "decrease",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "set" => Some(ActionKind::Set),
            "increase" => Some(ActionKind::Increase),
            "decrease" => Some(ActionKind::Decrease),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot names and values that select one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Slot names that may carry this action
    pub intents: Vec<String>,

    /// Slot values that select this action
    #[serde(default, deserialize_with = "nullable_list")]
    pub synonyms: Vec<String>,

    /// Slot names whose value says whether the change is "to" or "by"
    #[serde(default)]
    pub modifier_intents: Option<Vec<String>>,
}

/// A literal listed under `values.ignore` or `values.additional`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSpec {
    pub ranged: bool,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub ignore: Vec<Literal>,
    pub additional: Vec<Literal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Number,
    #[serde(other)]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSetIntent {
    pub datatype: Datatype,
}

/// Everything the mapper knows about one vehicle signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSpec {
    #[serde(deserialize_with = "scalar_string")]
    pub default_value: String,
    #[serde(deserialize_with = "scalar_string")]
    pub default_change_factor: String,
    pub actions: IndexMap<ActionKind, ActionSpec>,
    pub values: ValueSpec,
    pub default_fallback: bool,
    pub value_set_intents: IndexMap<String, ValueSetIntent>,
}

#[derive(Debug, Deserialize)]
struct IntentEntry {
    #[serde(default)]
    signals: Vec<String>,
}

/// Immutable, validated view of the intent map and the signal specifications
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    intents: IndexMap<String, Vec<String>>,
    signals: IndexMap<String, SignalSpec>,
}

impl Catalog {
    /// Load and validate both catalog documents from disk
    pub fn load(
        intents_path: impl AsRef<Path>,
        signals_path: impl AsRef<Path>,
    ) -> Result<Self, ValidationError> {
        let intents = read_json(intents_path.as_ref())?;
        let signals = read_json(signals_path.as_ref())?;
        let catalog = Self::from_values(intents, signals)?;

        info!(
            "Signal catalog loaded: {} intents, {} signals",
            catalog.intents.len(),
            catalog.signals.len()
        );

        Ok(catalog)
    }

    /// Build a catalog from the two JSON documents
    pub fn from_json(intents: &str, signals: &str) -> Result<Self, ValidationError> {
        Self::from_values(serde_json::from_str(intents)?, serde_json::from_str(signals)?)
    }

    pub fn from_values(intents: Value, signals: Value) -> Result<Self, ValidationError> {
        let intents_obj = section(intents, "intents")?;
        let signals_obj = section(signals, "signals")?;

        let mut parsed_signals = IndexMap::with_capacity(signals_obj.len());
        for (name, data) in signals_obj {
            if let Err(e) = validate_signal(&name, &data) {
                error!("{}", e);
                return Err(e);
            }

            let spec: SignalSpec = serde_json::from_value(data).map_err(|source| {
                ValidationError::Malformed {
                    signal: name.clone(),
                    source,
                }
            })?;

            if spec.values.ranged {
                match (spec.values.start, spec.values.end) {
                    (Some(start), Some(end)) if start <= end => {}
                    _ => {
                        let e = ValidationError::InvalidRange { signal: name };
                        error!("{}", e);
                        return Err(e);
                    }
                }
            }

            parsed_signals.insert(name, spec);
        }

        let mut parsed_intents = IndexMap::with_capacity(intents_obj.len());
        for (name, data) in intents_obj {
            let entry: IntentEntry = serde_json::from_value(data).map_err(|source| {
                ValidationError::MalformedIntent {
                    intent: name.clone(),
                    source,
                }
            })?;
            parsed_intents.insert(name, entry.signals);
        }

        Ok(Self {
            intents: parsed_intents,
            signals: parsed_signals,
        })
    }

    pub fn signal(&self, name: &str) -> Option<&SignalSpec> {
        self.signals.get(name)
    }

    /// Signal names associated with an intent, in declaration order
    pub fn intent_signals(&self, intent: &str) -> Option<&[String]> {
        self.intents.get(intent).map(Vec::as_slice)
    }

    pub fn signals(&self) -> impl Iterator<Item = (&String, &SignalSpec)> {
        self.signals.iter()
    }

    pub fn intent_names(&self) -> impl Iterator<Item = &String> {
        self.intents.keys()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }
}

fn read_json(path: &Path) -> Result<Value, ValidationError> {
    let text = fs::read_to_string(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn section(doc: Value, key: &'static str) -> Result<serde_json::Map<String, Value>, ValidationError> {
    match doc {
        Value::Object(mut root) => match root.remove(key) {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(ValidationError::MissingSection(key)),
        },
        _ => Err(ValidationError::MissingSection(key)),
    }
}

/// Structural checks on the raw JSON, run before typed decoding so the
/// errors name the rule that was broken.
fn validate_signal(name: &str, data: &Value) -> Result<(), ValidationError> {
    let signal = || name.to_string();

    let obj = data.as_object().ok_or_else(|| ValidationError::MissingKeys {
        signal: signal(),
        keys: REQUIRED_SIGNAL_KEYS.to_vec(),
    })?;

    let missing: Vec<&'static str> = REQUIRED_SIGNAL_KEYS
        .iter()
        .copied()
        .filter(|key| !obj.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingKeys {
            signal: signal(),
            keys: missing,
        });
    }

    let actions = match &obj["actions"] {
        Value::Object(actions) if !actions.is_empty() => actions,
        _ => return Err(ValidationError::InvalidActions { signal: signal() }),
    };

    for action in actions.keys() {
        if ActionKind::parse(action).is_none() {
            return Err(ValidationError::UnknownAction {
                signal: signal(),
                action: action.clone(),
            });
        }
    }

    for (action, action_data) in actions {
        let synonyms_ok = match action_data.get("synonyms") {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.iter().all(Value::is_string),
            Some(_) => false,
        };
        if !synonyms_ok {
            return Err(ValidationError::InvalidSynonyms {
                signal: signal(),
                action: action.clone(),
            });
        }
    }

    let values = match &obj["values"] {
        Value::Object(values) if REQUIRED_VALUE_KEYS.iter().all(|k| values.contains_key(*k)) => {
            values
        }
        _ => return Err(ValidationError::InvalidValues { signal: signal() }),
    };

    if !values["ranged"].is_boolean() {
        return Err(ValidationError::NotBoolean {
            signal: signal(),
            field: "ranged",
        });
    }

    if !obj["default_fallback"].is_boolean() {
        return Err(ValidationError::NotBoolean {
            signal: signal(),
            field: "default_fallback",
        });
    }

    Ok(())
}

/// Accept a JSON string, number or boolean and keep its textual form
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
