use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{ActionKind, Catalog, Datatype, Literal, SignalSpec};
use super::words::words_to_number;

/// A named value extracted from an utterance by the NLU engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSlot {
    pub name: String,
    pub value: String,
}

impl IntentSlot {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One concrete signal mutation in an execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionItem {
    pub action: ActionKind,
    pub signal: String,

    /// Absolute target value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Relative change, only for increase/decrease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<String>,
}

impl ExecutionItem {
    fn with_value(action: ActionKind, signal: &str, value: impl Into<String>) -> Self {
        Self {
            action,
            signal: signal.to_string(),
            value: Some(value.into()),
            factor: None,
        }
    }

    fn with_factor(action: ActionKind, signal: &str, factor: impl Into<String>) -> Self {
        Self {
            action,
            signal: signal.to_string(),
            value: None,
            factor: Some(factor.into()),
        }
    }
}

/// Whether an increase/decrease names a target ("to") or a step ("by")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    To,
    By,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::To => f.write_str("to"),
            Modifier::By => f.write_str("by"),
        }
    }
}

/// Maps intents and their slots onto vehicle signal actions.
///
/// Holds no mutable state; clones share the same catalog.
#[derive(Debug, Clone)]
pub struct Mapper {
    catalog: Arc<Catalog>,
}

impl Mapper {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Signals an intent may affect. Unknown intents and signals are skipped.
    pub fn resolve_signals(&self, intent_name: &str) -> IndexMap<&str, &SignalSpec> {
        let mut result = IndexMap::new();

        if let Some(names) = self.catalog.intent_signals(intent_name) {
            for name in names {
                if let Some(spec) = self.catalog.signal(name) {
                    result.entry(name.as_str()).or_insert(spec);
                }
            }
        }

        result
    }

    /// Build the execution plan for an intent.
    ///
    /// Signals are visited in intent-map order, so identical input always
    /// yields an identical plan.
    pub fn parse_intent(
        &self,
        intent_name: &str,
        slots: &[IntentSlot],
        req_id: &str,
    ) -> Vec<ExecutionItem> {
        let signals = self.resolve_signals(intent_name);
        if signals.is_empty() {
            debug!("[ReqID#{}] No signals mapped for intent '{}'", req_id, intent_name);
        }

        let mut plan = Vec::new();

        for (signal, spec) in signals {
            let action = determine_action(spec, slots);
            let modifier = determine_modifier(spec, slots);
            let original = determine_value(spec, slots);

            let mut value = original.clone().filter(|v| verify_value(spec, v));
            let mut change_factor = spec.default_change_factor.clone();

            if let Some(action @ (ActionKind::Increase | ActionKind::Decrease)) = action {
                match (value.as_deref().filter(|v| !v.is_empty()), modifier) {
                    (Some(v), Some(Modifier::By)) => {
                        plan.push(ExecutionItem::with_factor(action, signal, v));
                        change_factor = v.to_string();
                    }
                    (Some(v), _) => plan.push(ExecutionItem::with_value(action, signal, v)),
                    (None, _) if spec.default_fallback => {
                        plan.push(ExecutionItem::with_factor(action, signal, &change_factor));
                    }
                    (None, _) => {}
                }
            }

            if value.is_none() && spec.default_fallback {
                value = Some(spec.default_value.clone());
            }

            if let (Some(ActionKind::Set), Some(v)) = (action, &value) {
                plan.push(ExecutionItem::with_value(ActionKind::Set, signal, v));
            }

            info!(
                "[ReqID#{}] Mapper log: signal={} action={} modifier={} original_value={:?} processed_value={:?} change_factor={}",
                req_id,
                signal,
                action.map(|a| a.as_str()).unwrap_or("none"),
                modifier.map(|m| m.to_string()).unwrap_or_else(|| "none".into()),
                original,
                value,
                change_factor
            );
        }

        plan
    }
}

/// Select the action named by the slots. For each slot the first declared
/// action that lists both the slot name and value is taken; the last
/// matching slot wins.
pub fn determine_action(spec: &SignalSpec, slots: &[IntentSlot]) -> Option<ActionKind> {
    slots.iter().fold(None, |selected, slot| {
        spec.actions
            .iter()
            .find(|(_, action)| {
                action.intents.contains(&slot.name) && action.synonyms.contains(&slot.value)
            })
            .map(|(kind, _)| *kind)
            .or(selected)
    })
}

/// Find a "to"/"by" modifier among the slots. "to" is checked first, so a
/// value containing both resolves to [`Modifier::To`]. Last match wins.
pub fn determine_modifier(spec: &SignalSpec, slots: &[IntentSlot]) -> Option<Modifier> {
    slots.iter().fold(None, |selected, slot| {
        let value = slot.value.as_str();
        let has_to = value.contains("to");

        let declared = spec.actions.values().any(|action| {
            action
                .modifier_intents
                .as_ref()
                .is_some_and(|names| names.contains(&slot.name))
        });

        if declared && (has_to || value.contains("by")) {
            Some(if has_to { Modifier::To } else { Modifier::By })
        } else {
            selected
        }
    })
}

/// Extract the value slot. Numeric slots are converted from spoken words.
/// Last match wins.
pub fn determine_value(spec: &SignalSpec, slots: &[IntentSlot]) -> Option<String> {
    slots.iter().fold(None, |selected, slot| {
        match spec.value_set_intents.get(&slot.name) {
            Some(intent) => Some(match intent.datatype {
                Datatype::Number => words_to_number(&slot.value),
                Datatype::Text => slot.value.clone(),
            }),
            None => selected,
        }
    })
}

/// Slot value after numeric coercion
#[derive(Debug, Clone, Copy, PartialEq)]
enum Coerced<'a> {
    Number(f64),
    Text(&'a str),
}

fn coerce(value: &str) -> Coerced<'_> {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    let dots = value.chars().filter(|&c| c == '.').count();

    if digits > 0 && digits + dots == value.len() && dots <= 1 {
        if let Ok(n) = value.parse::<f64>() {
            return Coerced::Number(n);
        }
    }

    Coerced::Text(value)
}

fn literal_matches(literal: &Literal, value: Coerced<'_>) -> bool {
    match (literal, value) {
        (Literal::Number(n), Coerced::Number(v)) => *n == v,
        (Literal::Bool(b), Coerced::Number(v)) => v == if *b { 1.0 } else { 0.0 },
        (Literal::Text(s), Coerced::Text(v)) => s == v,
        _ => false,
    }
}

/// Check a candidate value against the signal's ignore list, range and
/// allowed extra values.
pub fn verify_value(spec: &SignalSpec, value: &str) -> bool {
    let coerced = coerce(value);
    let values = &spec.values;

    if values.ignore.iter().any(|l| literal_matches(l, coerced)) {
        return false;
    }

    if values.ranged {
        if let Coerced::Number(v) = coerced {
            return match (values.start, values.end) {
                (Some(start), Some(end)) => start <= v && v <= end,
                _ => false,
            };
        }
    }

    values.additional.iter().any(|l| literal_matches(l, coerced))
}
