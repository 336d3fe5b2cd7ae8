use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::client::{SignalClient, SignalClientError};
use crate::mapper::{ActionKind, ExecutionItem, IntentSlot, Mapper, SignalSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteStatus {
    Success,
    PartialFailure,
    Failed,
    NoActions,
}

/// What happened to one execution item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    #[serde(flatten)]
    pub item: ExecutionItem,
    /// Value written to the signal, when one was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub status: ExecuteStatus,
    pub items: Vec<ItemOutcome>,
}

/// Runs execution plans against a signal client
#[derive(Clone)]
pub struct CommandExecutor {
    mapper: Mapper,
    client: Arc<dyn SignalClient>,
    retry_attempts: u32,
}

impl CommandExecutor {
    pub fn new(mapper: Mapper, client: Arc<dyn SignalClient>, retry_attempts: u32) -> Self {
        Self {
            mapper,
            client,
            retry_attempts,
        }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub async fn execute(&self, intent: &str, slots: &[IntentSlot], req_id: &str) -> ExecuteResult {
        let plan = self.mapper.parse_intent(intent, slots, req_id);

        if plan.is_empty() {
            info!("[ReqID#{}] No actions for intent '{}'", req_id, intent);
            return ExecuteResult {
                status: ExecuteStatus::NoActions,
                items: Vec::new(),
            };
        }

        let mut items = Vec::with_capacity(plan.len());
        for item in plan {
            let outcome = match self.apply(&item).await {
                Ok((applied, success)) => ItemOutcome {
                    item,
                    applied,
                    success,
                    error: None,
                },
                Err(e) => {
                    error!("[ReqID#{}] Failed to apply {} on {}: {}", req_id, item.action, item.signal, e);
                    ItemOutcome {
                        item,
                        applied: None,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            items.push(outcome);
        }

        let applied = items.iter().filter(|o| o.success).count();
        let status = match applied {
            n if n == items.len() => ExecuteStatus::Success,
            0 => ExecuteStatus::Failed,
            _ => ExecuteStatus::PartialFailure,
        };

        info!("[ReqID#{}] Executed {}/{} actions for '{}'", req_id, applied, items.len(), intent);

        ExecuteResult { status, items }
    }

    async fn apply(&self, item: &ExecutionItem) -> Result<(Option<String>, bool), SignalClientError> {
        let target = match (&item.value, &item.factor) {
            (Some(value), _) => value.clone(),
            (None, Some(factor)) => {
                let current = self.with_retry(|| self.client.get_value(&item.signal)).await?;
                let spec = self.mapper.catalog().signal(&item.signal);

                match apply_factor(item.action, current.as_deref(), factor, spec) {
                    Some(target) => target,
                    None => {
                        warn!(
                            "Cannot apply factor {} to {} (current value {:?})",
                            factor, item.signal, current
                        );
                        return Ok((None, false));
                    }
                }
            }
            (None, None) => return Ok((None, false)),
        };

        let success = self
            .with_retry(|| self.client.set_value(&item.signal, &target))
            .await?;

        Ok((Some(target), success))
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, SignalClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SignalClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    warn!("Signal broker call failed ({}), retry {}/{}", e, attempt, self.retry_attempts);
                }
                result => return result,
            }
        }
    }
}

/// Compute the new value for a relative change. Returns `None` when the
/// current value or factor is not numeric.
pub(crate) fn apply_factor(
    action: ActionKind,
    current: Option<&str>,
    factor: &str,
    spec: Option<&SignalSpec>,
) -> Option<String> {
    let current: f64 = current?.trim().parse().ok()?;
    let factor: f64 = factor.trim().parse().ok()?;

    let mut target = match action {
        ActionKind::Increase => current + factor,
        ActionKind::Decrease => current - factor,
        ActionKind::Set => factor,
    };

    if let Some(values) = spec.map(|s| &s.values).filter(|v| v.ranged) {
        if let Some(start) = values.start {
            target = target.max(start);
        }
        if let Some(end) = values.end {
            target = target.min(end);
        }
    }

    Some(format_number(target))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
