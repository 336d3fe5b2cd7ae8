use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Recording session {0} not found")]
    SessionNotFound(String),
}

/// An in-flight voice recording, owned by whoever removed it from the registry
#[derive(Debug)]
pub struct RecordingSession<H> {
    pub id: String,
    pub handle: H,
    pub artifact: PathBuf,
    pub started_at: Instant,
}

impl<H> RecordingSession<H> {
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Concurrent store of recording sessions keyed by their 8-digit id.
///
/// Every operation locks a single shard for the duration of a map access.
/// Nothing is ever awaited while a shard is held.
#[derive(Debug)]
pub struct SessionRegistry<H> {
    sessions: DashMap<String, RecordingSession<H>>,
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<H> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its fresh id
    pub fn begin(&self, handle: H, artifact: PathBuf) -> String {
        loop {
            let id = generate_session_id();
            match self.sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Session id {} already in use, generating another", id);
                }
                Entry::Vacant(slot) => {
                    slot.insert(RecordingSession {
                        id: id.clone(),
                        handle,
                        artifact,
                        started_at: Instant::now(),
                    });
                    return id;
                }
            }
        }
    }

    /// Remove a session. Of several concurrent calls for one id, exactly one
    /// gets the session.
    pub fn end(&self, id: &str) -> Result<RecordingSession<H>, RegistryError> {
        self.sessions
            .remove(id)
            .map(|(_, session)| session)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove and return every session older than `max_age`
    pub fn reap_expired(&self, max_age: Duration) -> Vec<RecordingSession<H>> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.age() >= max_age)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, session| session.age() >= max_age)
                    .map(|(_, session)| session)
            })
            .collect()
    }
}

/// Random 8-digit, zero-padded decimal id
pub fn generate_session_id() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 100_000_000;
    format!("{:08}", n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_session_id_format() {
        for _ in 0..1000 {
            let id = generate_session_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_begin_end() {
        let registry = SessionRegistry::new();
        let id = registry.begin("handle", PathBuf::from("/tmp/a.wav"));

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        let session = registry.end(&id).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.handle, "handle");
        assert_eq!(session.artifact, PathBuf::from("/tmp/a.wav"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_end() {
        let registry = SessionRegistry::new();
        let id = registry.begin((), PathBuf::from("/tmp/a.wav"));

        assert!(registry.end(&id).is_ok());
        assert_eq!(registry.end(&id).unwrap_err(), RegistryError::SessionNotFound(id));
    }

    #[test]
    fn test_end_unknown_leaves_state_unchanged() {
        let registry = SessionRegistry::new();
        let id = registry.begin((), PathBuf::from("/tmp/a.wav"));

        assert!(registry.end("00000000x").is_err());
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reap_expired() {
        let registry = SessionRegistry::new();
        registry.begin(1, PathBuf::from("/tmp/1.wav"));
        registry.begin(2, PathBuf::from("/tmp/2.wav"));

        assert!(registry.reap_expired(Duration::from_secs(3600)).is_empty());
        assert_eq!(registry.len(), 2);

        let reaped = registry.reap_expired(Duration::ZERO);
        assert_eq!(reaped.len(), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_begin_unique() {
        let registry = Arc::new(SessionRegistry::new());

        let tasks: Vec<_> = (0..1000)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.begin(i, PathBuf::from(format!("/tmp/{}.wav", i))) })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }

        assert_eq!(ids.len(), 1000);
        assert_eq!(registry.len(), 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_end_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let id = registry.begin((), PathBuf::from("/tmp/a.wav"));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { registry.end(&id).is_ok() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
