//! Intent to vehicle signal mapping
//!
//! - `catalog`: validated signal specifications and the intent → signal map
//! - `engine`: turns an intent and its slots into an execution plan
//! - `words`: spoken-word number parsing for numeric slots

pub mod catalog;
pub mod engine;
pub mod words;

pub use catalog::{ActionKind, ActionSpec, Catalog, Datatype, Literal, SignalSpec, ValidationError, ValueSpec};
pub use engine::{
    determine_action, determine_modifier, determine_value, verify_value, ExecutionItem,
    IntentSlot, Mapper, Modifier,
};
pub use words::words_to_number;
