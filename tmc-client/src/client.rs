//! # Memcached Facade Client
//!
//! Purpose: Expose the small memcached operation surface (set, get, and the
//! arithmetic family) on top of per-thread backend handles.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `MemClient` hides handle caching and the backend
//!    library behind a compact call surface.
//! 2. **Soft Failure**: Every backend or handle failure degrades to an
//!    absent or zero result that callers treat as a cache miss; nothing
//!    panics and nothing propagates.
//! 3. **Injected Configuration**: The server list is a constructor argument
//!    and never changes for the life of the client.
//! 4. **Capability Gating**: Initial-value arithmetic is checked against the
//!    handle's reported capabilities before any wire call.

use crate::backend::{Connector, MemcacheConnector, Value};
use crate::config::ServerConfig;
use crate::registry::{HandleCache, HandleId};

/// Thread-affine memcached client facade.
///
/// The client itself is shared freely across threads; each calling thread
/// lazily receives its own backend handle and keeps it until the thread
/// exits. Operations never fail loudly: trouble anywhere below shows up as
/// `None` or 0, with a diagnostic on the tracing channel.
pub struct MemClient {
    cache: HandleCache,
}

impl MemClient {
    /// Creates a client that connects through the memcache backend library.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(Box::new(MemcacheConnector::new(config)))
    }

    /// Creates a client from a custom connector.
    ///
    /// This is the seam for alternate backend libraries and for tests.
    pub fn with_connector(connector: Box<dyn Connector>) -> Self {
        MemClient {
            cache: HandleCache::new(connector),
        }
    }

    /// Returns the calling thread's handle identity, creating the handle on
    /// first use. `None` when no handle could be created.
    pub fn handle_id(&self) -> Option<HandleId> {
        self.cache.handle().map(|handle| handle.id())
    }

    /// Stores `value` under `key` with the given expiration and flags.
    ///
    /// A no-op when no handle is available; backend errors are logged and
    /// swallowed.
    pub fn set(&self, key: &str, value: &[u8], expiration: u32, flags: u32) {
        let handle = match self.cache.handle() {
            Some(handle) => handle,
            None => return,
        };
        if let Err(err) = handle.backend().set(key, value, expiration, flags) {
            tracing::debug!(key, error = %err, "set failed");
        }
    }

    /// Fetches the value stored under `key`.
    ///
    /// Returns `None` on a miss, on any backend failure, or when no handle
    /// is available. The returned bytes are owned by the caller.
    pub fn get(&self, key: &str) -> Option<Value> {
        let handle = self.cache.handle()?;
        match handle.backend().get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "get failed");
                None
            }
        }
    }

    /// Adds `offset` to the counter stored under `key`.
    ///
    /// Returns 0 when the key is missing, the backend fails, or no handle is
    /// available.
    pub fn incr(&self, key: &str, offset: u64) -> u64 {
        let handle = match self.cache.handle() {
            Some(handle) => handle,
            None => return 0,
        };
        match handle.backend().increment(key, offset) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "incr failed");
                0
            }
        }
    }

    /// Subtracts `offset` from the counter stored under `key`.
    ///
    /// Returns 0 when the key is missing, the backend fails, or no handle is
    /// available.
    pub fn decr(&self, key: &str, offset: u64) -> u64 {
        let handle = match self.cache.handle() {
            Some(handle) => handle,
            None => return 0,
        };
        match handle.backend().decrement(key, offset) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "decr failed");
                0
            }
        }
    }

    /// Adds `offset` to `key`, seeding it with `initial` when missing.
    ///
    /// Requires backend support for initial-value arithmetic. Without it the
    /// call logs one diagnostic and returns 0 without touching the backend.
    pub fn incr_set(&self, key: &str, offset: u64, initial: u64, expiration: u32) -> u64 {
        let handle = match self.cache.handle() {
            Some(handle) => handle,
            None => return 0,
        };
        if !handle.backend().capabilities().with_initial {
            tracing::warn!(key, "initial-value arithmetic unsupported by backend");
            return 0;
        }
        match handle
            .backend()
            .increment_with_initial(key, offset, initial, expiration)
        {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "incr_set failed");
                0
            }
        }
    }

    /// Subtracts `offset` from `key`, seeding it with `initial` when missing.
    ///
    /// Requires backend support for initial-value arithmetic. Without it the
    /// call logs one diagnostic and returns 0 without touching the backend.
    pub fn decr_set(&self, key: &str, offset: u64, initial: u64, expiration: u32) -> u64 {
        let handle = match self.cache.handle() {
            Some(handle) => handle,
            None => return 0,
        };
        if !handle.backend().capabilities().with_initial {
            tracing::warn!(key, "initial-value arithmetic unsupported by backend");
            return 0;
        }
        match handle
            .backend()
            .decrement_with_initial(key, offset, initial, expiration)
        {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "decr_set failed");
                0
            }
        }
    }
}
