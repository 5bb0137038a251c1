//! Single-flight deduplication of content generation
//!
//! When many learners miss on the same key at once, exactly one generation
//! call runs; every concurrent caller waits on the same in-flight result.
//! The leader runs generation on a detached task, so a caller abandoning its
//! wait (deadline, disconnect) never cancels work other callers depend on.

use crate::cache::key::CacheKey;
use crate::errors::{GenerationError, GenerationResult};
use crate::traits::ContentArtifact;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

type FlightSender = broadcast::Sender<GenerationResult<ContentArtifact>>;

/// Coordinates concurrent generations for the same key
pub struct SingleFlightCoordinator {
    inflight: Arc<DashMap<CacheKey, FlightSender>>,
}

impl SingleFlightCoordinator {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Run `generate` for `key`, deduplicated: the first caller becomes the
    /// leader and spawns the generation; later callers arriving before the
    /// flight lands subscribe to its outcome instead of generating again.
    ///
    /// The in-flight marker is removed BEFORE the result is broadcast, so a
    /// caller subscribing after the send starts a fresh flight rather than
    /// waiting on a channel that will never fire again.
    pub async fn execute<F, Fut>(
        &self,
        key: &CacheKey,
        generate: F,
    ) -> GenerationResult<ContentArtifact>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GenerationResult<ContentArtifact>> + Send + 'static,
    {
        let (leader_tx, mut rx) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                debug!(key = %key.render(), "Joining in-flight generation");
                (None, occupied.get().subscribe())
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                (Some(tx), rx)
            }
        };

        // Spawn only after the map entry guard above is released
        if let Some(tx) = leader_tx {
            let inflight = Arc::clone(&self.inflight);
            let flight_key = key.clone();
            let future = generate();
            tokio::spawn(async move {
                let result = future.await;
                inflight.remove(&flight_key);
                let _ = tx.send(result);
            });
        }

        match rx.recv().await {
            Ok(result) => result,
            Err(err) => Err(GenerationError::FlightInterrupted {
                reason: err.to_string(),
            }),
        }
    }

    /// Number of keys with a generation currently in flight
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl Default for SingleFlightCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
