//! Vehicle signal execution
//!
//! `SignalClient` is the seam to the signal broker. `CommandExecutor` turns
//! an intent into an execution plan and drives it through a client.

mod client;
mod executor;

pub use client::{InMemorySignals, NatsSignalClient, SignalClient, SignalClientError};
pub use executor::{CommandExecutor, ExecuteResult, ExecuteStatus, ItemOutcome};
