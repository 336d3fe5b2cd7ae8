use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::nats::NatsClient;

#[derive(Debug, thiserror::Error)]
pub enum SignalClientError {
    #[error("Signal broker connection failed: {0}")]
    Connection(String),

    #[error("Signal broker rejected request for '{path}': {reason}")]
    Rejected { path: String, reason: String },
}

impl SignalClientError {
    /// Connection failures are worth retrying, rejections are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalClientError::Connection(_))
    }
}

/// Access to current vehicle signal values
#[async_trait::async_trait]
pub trait SignalClient: Send + Sync {
    /// Write a target value. `Ok(false)` means the broker refused it.
    async fn set_value(&self, path: &str, value: &str) -> Result<bool, SignalClientError>;

    async fn get_value(&self, path: &str) -> Result<Option<String>, SignalClientError>;
}

/// Signal store kept in process, for tests and for running without a broker
#[derive(Debug, Clone, Default)]
pub struct InMemorySignals {
    values: Arc<DashMap<String, String>>,
}

impl InMemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let signals = Self::new();
        for (k, v) in values {
            signals.values.insert(k.into(), v.into());
        }
        signals
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.values.get(path).map(|v| v.value().clone())
    }
}

#[async_trait::async_trait]
impl SignalClient for InMemorySignals {
    async fn set_value(&self, path: &str, value: &str) -> Result<bool, SignalClientError> {
        self.values.insert(path.to_string(), value.to_string());
        Ok(true)
    }

    async fn get_value(&self, path: &str) -> Result<Option<String>, SignalClientError> {
        Ok(self.get(path))
    }
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    path: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignalReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Signal broker bridge reached via NATS request/reply on
/// `<prefix>.set` and `<prefix>.get`
pub struct NatsSignalClient {
    client: Arc<NatsClient>,
    prefix: String,
    timeout: Duration,
}

impl NatsSignalClient {
    pub fn new(client: Arc<NatsClient>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            timeout,
        }
    }

    async fn request<Req: Serialize + Sync>(
        &self,
        op: &str,
        request: &Req,
    ) -> Result<SignalReply, SignalClientError> {
        let subject = format!("{}.{}", self.prefix, op);
        self.client
            .request_json(&subject, request, self.timeout)
            .await
            .map_err(|e| SignalClientError::Connection(format!("{:#}", e)))
    }
}

#[async_trait::async_trait]
impl SignalClient for NatsSignalClient {
    async fn set_value(&self, path: &str, value: &str) -> Result<bool, SignalClientError> {
        let reply = self.request("set", &SetRequest { path, value }).await?;
        if let Some(reason) = reply.error {
            debug!("Broker refused {} = {}: {}", path, value, reason);
        }
        Ok(reply.ok)
    }

    async fn get_value(&self, path: &str) -> Result<Option<String>, SignalClientError> {
        let reply = self.request("get", &GetRequest { path }).await?;

        if let Some(reason) = reply.error {
            return Err(SignalClientError::Rejected {
                path: path.to_string(),
                reason,
            });
        }

        Ok(reply.value.and_then(|v| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }))
    }
}
