//! # Server List Configuration
//!
//! Purpose: Turn a backend server configuration string into the connection
//! targets handed to the memcached client library.
//!
//! ## Design Principles
//! 1. **Explicit Format Tag**: The caller states which syntax a string uses
//!    instead of the parser guessing from its content.
//! 2. **Fail Early**: Malformed host:port lists are rejected at parse time,
//!    before any connection attempt is made.
//! 3. **Native Passthrough**: Connection specs the backend library already
//!    understands are forwarded untouched.
//! 4. **Serde-Friendly**: Config types derive serde traits so host config
//!    files can embed them directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default memcached port used when a host:port entry omits the port.
pub const DEFAULT_PORT: u16 = 11211;

/// Marker identifying a native backend connection spec.
const SCHEME_MARKER: &str = "://";

/// Errors produced while resolving a server configuration string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration contains no server entries.
    #[error("server list is empty")]
    Empty,
    /// A host:port entry has an empty host component.
    #[error("server entry {index} has an empty host")]
    EmptyHost {
        /// Zero-based position of the offending entry.
        index: usize,
    },
    /// A host:port entry has a port that does not parse as a u16.
    #[error("server entry {index} has an invalid port: {port:?}")]
    InvalidPort {
        /// Zero-based position of the offending entry.
        index: usize,
        /// The rejected port text.
        port: String,
    },
}

/// Syntax of a server configuration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerFormat {
    /// A connection spec understood natively by the backend library,
    /// e.g. `memcache://10.0.0.1:11211`.
    Native,
    /// A legacy comma-separated `host:port` list that must be parsed into
    /// discrete server records.
    HostPort,
}

/// A single backend server parsed from a legacy host:port list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddr {
    /// Hostname or address literal.
    pub host: String,
    /// TCP port, [`DEFAULT_PORT`] when the entry omitted it.
    pub port: u16,
}

impl ServerAddr {
    /// Connection URL for this server in the backend library's syntax.
    pub fn url(&self) -> String {
        format!("memcache://{}:{}", self.host, self.port)
    }
}

/// Immutable backend server configuration.
///
/// A config is created once, injected into the client at construction, and
/// never changes afterwards. Handles created from an earlier config keep it
/// for their whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    format: ServerFormat,
    raw: String,
}

impl ServerConfig {
    /// Wraps a connection spec passed through to the backend library as-is.
    pub fn native(spec: impl Into<String>) -> Self {
        ServerConfig {
            format: ServerFormat::Native,
            raw: spec.into(),
        }
    }

    /// Wraps a legacy comma-separated `host:port` list.
    pub fn host_port(list: impl Into<String>) -> Self {
        ServerConfig {
            format: ServerFormat::HostPort,
            raw: list.into(),
        }
    }

    /// Classifies an untagged configuration string.
    ///
    /// Provided for hosts that hand over a bare string and cannot supply a
    /// format tag. A string carrying a URL scheme marker is treated as
    /// native syntax, anything else as a host:port list. Prefer the explicit
    /// constructors; a host literal containing `://` would misclassify here.
    pub fn detect(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let format = if raw.contains(SCHEME_MARKER) {
            ServerFormat::Native
        } else {
            ServerFormat::HostPort
        };
        ServerConfig { format, raw }
    }

    /// Returns the declared syntax of this configuration.
    pub fn format(&self) -> ServerFormat {
        self.format
    }

    /// Returns the configuration string as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Resolves the configuration into backend connection URLs.
    pub fn server_urls(&self) -> Result<Vec<String>, ConfigError> {
        match self.format {
            ServerFormat::Native => {
                if self.raw.trim().is_empty() {
                    return Err(ConfigError::Empty);
                }
                Ok(vec![self.raw.clone()])
            }
            ServerFormat::HostPort => {
                let servers = parse_host_port_list(&self.raw)?;
                Ok(servers.iter().map(ServerAddr::url).collect())
            }
        }
    }
}

/// Parses a comma-separated `host:port` list into discrete server records.
///
/// Entries are trimmed and blank segments are skipped, so trailing commas are
/// tolerated. An entry without a colon gets [`DEFAULT_PORT`]. The split is on
/// the last colon, so hosts with embedded colons keep them.
pub fn parse_host_port_list(raw: &str) -> Result<Vec<ServerAddr>, ConfigError> {
    let mut servers = Vec::new();
    for (index, entry) in raw.split(',').enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (host, port) = match entry.rsplit_once(':') {
            Some((host, port)) => {
                let parsed = port.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                    index,
                    port: port.to_string(),
                })?;
                (host, parsed)
            }
            None => (entry, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ConfigError::EmptyHost { index });
        }
        servers.push(ServerAddr {
            host: host.to_string(),
            port,
        });
    }
    if servers.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(servers)
}
