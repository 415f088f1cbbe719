//! # Backend Client Abstraction
//!
//! Purpose: Hide the external memcached client library behind a small trait
//! pair so per-thread handles can be created from configuration and replaced
//! with fakes in tests.
//!
//! ## Design Principles
//! 1. **Thin Delegation**: The backend owns protocol, hashing, and server
//!    selection; this layer only translates arguments and results.
//! 2. **Capability Reporting**: Feature gaps in the backend library surface
//!    as a runtime report, not as failed wire calls.
//! 3. **Raw Bytes**: Values cross the seam as plain bytes plus stored flags,
//!    with no encoding policy of our own.

use std::io::Write;

use bytes::Bytes;
use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};

/// A value fetched from the backend together with its stored flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// The cached bytes, owned by the caller.
    pub data: Bytes,
    /// Flags stored alongside the value.
    pub flags: u32,
}

/// Feature set reported by a backend handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether the backend supports arithmetic seeded with an initial value.
    pub with_initial: bool,
}

/// Errors surfaced by backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend library rejected or failed the operation. Covers network
    /// trouble and missing keys alike; callers do not distinguish them.
    #[error(transparent)]
    Memcache(#[from] memcache::MemcacheError),
    /// The operation is not supported by this backend.
    #[error("operation not supported by backend")]
    Unsupported,
    /// Failure reported by a non-memcache backend implementation.
    #[error("{0}")]
    Other(String),
}

/// Errors produced while creating a backend handle.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server configuration did not resolve to any connection target.
    #[error("invalid server configuration: {0}")]
    Config(#[from] ConfigError),
    /// The backend library could not build a client instance.
    #[error("backend client creation failed: {0}")]
    Memcache(#[from] memcache::MemcacheError),
}

/// Operations the facade needs from a backend client handle.
///
/// One instance is bound to the thread that created it, so implementations
/// do not need to be thread-safe.
pub trait Backend {
    /// Reports the features this handle supports.
    fn capabilities(&self) -> Capabilities;

    /// Stores `value` under `key` with the given expiration and flags.
    fn set(&self, key: &str, value: &[u8], expiration: u32, flags: u32) -> Result<(), BackendError>;

    /// Fetches the value stored under `key`, `None` on a miss.
    fn get(&self, key: &str) -> Result<Option<Value>, BackendError>;

    /// Adds `offset` to the counter stored under `key`.
    fn increment(&self, key: &str, offset: u64) -> Result<u64, BackendError>;

    /// Subtracts `offset` from the counter stored under `key`.
    fn decrement(&self, key: &str, offset: u64) -> Result<u64, BackendError>;

    /// Adds `offset` to `key`, seeding it with `initial` when missing.
    fn increment_with_initial(
        &self,
        key: &str,
        offset: u64,
        initial: u64,
        expiration: u32,
    ) -> Result<u64, BackendError>;

    /// Subtracts `offset` from `key`, seeding it with `initial` when missing.
    fn decrement_with_initial(
        &self,
        key: &str,
        offset: u64,
        initial: u64,
        expiration: u32,
    ) -> Result<u64, BackendError>;
}

/// Creates backend handles on demand.
///
/// The handle registry calls this at most once per thread, plus retries
/// after a failed attempt.
pub trait Connector: Send + Sync {
    /// Builds a fresh backend handle for the calling thread.
    fn connect(&self) -> Result<Box<dyn Backend>, ConnectError>;
}

/// Connector backed by the `memcache` client library.
pub struct MemcacheConnector {
    config: ServerConfig,
}

impl MemcacheConnector {
    /// Creates a connector that resolves `config` on every connect call.
    pub fn new(config: ServerConfig) -> Self {
        MemcacheConnector { config }
    }
}

impl Connector for MemcacheConnector {
    fn connect(&self) -> Result<Box<dyn Backend>, ConnectError> {
        let urls = self.config.server_urls()?;
        let client = memcache::Client::connect(urls)?;
        Ok(Box::new(MemcacheBackend { client }))
    }
}

/// Backend handle wrapping one `memcache::Client` instance.
struct MemcacheBackend {
    client: memcache::Client,
}

impl Backend for MemcacheBackend {
    fn capabilities(&self) -> Capabilities {
        // The library exposes plain increment/decrement only; the
        // initial-value variants are a binary protocol feature it does not
        // surface.
        Capabilities {
            with_initial: false,
        }
    }

    fn set(&self, key: &str, value: &[u8], expiration: u32, flags: u32) -> Result<(), BackendError> {
        self.client
            .set(key, RawValue { data: value, flags }, expiration)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let entry: Option<RawEntry> = self.client.get(key)?;
        Ok(entry.map(|entry| Value {
            data: Bytes::from(entry.data),
            flags: entry.flags,
        }))
    }

    fn increment(&self, key: &str, offset: u64) -> Result<u64, BackendError> {
        Ok(self.client.increment(key, offset)?)
    }

    fn decrement(&self, key: &str, offset: u64) -> Result<u64, BackendError> {
        Ok(self.client.decrement(key, offset)?)
    }

    fn increment_with_initial(
        &self,
        _key: &str,
        _offset: u64,
        _initial: u64,
        _expiration: u32,
    ) -> Result<u64, BackendError> {
        Err(BackendError::Unsupported)
    }

    fn decrement_with_initial(
        &self,
        _key: &str,
        _offset: u64,
        _initial: u64,
        _expiration: u32,
    ) -> Result<u64, BackendError> {
        Err(BackendError::Unsupported)
    }
}

/// Raw byte payload carrying caller-chosen flags to the wire.
struct RawValue<'a> {
    data: &'a [u8],
    flags: u32,
}

impl<'a, W: Write> memcache::ToMemcacheValue<W> for RawValue<'a> {
    fn get_flags(&self) -> u32 {
        self.flags
    }

    fn get_length(&self) -> usize {
        self.data.len()
    }

    fn write_to(&self, stream: &mut W) -> std::io::Result<()> {
        stream.write_all(self.data)
    }
}

/// Raw fetch result keeping value bytes and flags exactly as stored.
struct RawEntry {
    data: Vec<u8>,
    flags: u32,
}

impl memcache::FromMemcacheValue for RawEntry {
    fn from_memcache_value(value: Vec<u8>, flags: u32) -> Result<Self, memcache::MemcacheError> {
        Ok(RawEntry { data: value, flags })
    }
}
