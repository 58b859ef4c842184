//! Per-connection session state.
//!
//! A session starts uninitialised and moves to initialised exactly once. All
//! reads and transitions go through one mutex, so two concurrent `initialize`
//! requests cannot both observe "uninitialised" and both succeed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::mcp::protocol::RequestId;

/// Client information received during initialisation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    client: Option<ClientInfo>,
}

/// Initialisation state of one client session.
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    inner: Mutex<Inner>,
}

impl SessionState {
    /// Creates an uninitialised session with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Session identifier, used for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    // Poisoning is ignored: every critical section writes whole fields.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the session has completed initialisation.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Marks the session initialised.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition, which lets the `initialize` handler reject duplicates.
    pub fn mark_initialized(&self) -> bool {
        let mut inner = self.lock();
        let transitioned = !inner.initialized;
        inner.initialized = true;
        transitioned
    }

    /// Transitions to initialised and records the client in one step.
    ///
    /// Returns `false` without touching the recorded client when the session
    /// was already initialised.
    pub fn initialize_with(&self, client: Option<ClientInfo>) -> bool {
        let mut inner = self.lock();
        if inner.initialized {
            return false;
        }
        inner.initialized = true;
        inner.client = client;
        true
    }

    /// The client that initialised this session, if it identified itself.
    #[must_use]
    pub fn client(&self) -> Option<ClientInfo> {
        self.lock().client.clone()
    }

    /// Returns the session to the uninitialised state.
    ///
    /// Only used by administrative or teardown flows.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.initialized = false;
        inner.client = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation tokens of the requests in flight on one connection.
#[derive(Debug, Default)]
pub struct RequestTracker {
    tokens: Mutex<HashMap<RequestId, Tracked>>,
    generation: AtomicU64,
}

#[derive(Debug)]
struct Tracked {
    generation: u64,
    token: CancellationToken,
}

/// A request registered with a [`RequestTracker`].
///
/// Each registration gets its own generation, so finishing one request never
/// drops the entry of a later request that reused the same id.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    id: RequestId,
    generation: u64,
    token: CancellationToken,
}

impl TrackedRequest {
    /// The request id.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// The token the request's handler observes.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl RequestTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Tracked>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `id` with a child token of `parent`.
    ///
    /// A reused id replaces the earlier entry; the earlier request can then
    /// only be cancelled through [`cancel_all`](Self::cancel_all) or its
    /// parent token.
    pub fn track(&self, id: RequestId, parent: &CancellationToken) -> TrackedRequest {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        self.lock().insert(
            id.clone(),
            Tracked {
                generation,
                token: token.clone(),
            },
        );
        TrackedRequest {
            id,
            generation,
            token,
        }
    }

    /// Stops tracking `request`, unless its id has since been taken over by
    /// a newer request.
    pub fn finish(&self, request: &TrackedRequest) {
        let mut tokens = self.lock();
        if tokens
            .get(&request.id)
            .is_some_and(|tracked| tracked.generation == request.generation)
        {
            tokens.remove(&request.id);
        }
    }

    /// Cancels the request with `id`. Returns whether it was in flight.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let tracked = self.lock().remove(id);
        tracked.is_some_and(|tracked| {
            tracked.token.cancel();
            true
        })
    }

    /// Cancels every tracked request and returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, tracked) in &drained {
            tracked.token.cancel();
        }
        drained.len()
    }

    /// Number of tracked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
