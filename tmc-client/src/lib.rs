//! # ThreadMC Client
//!
//! Purpose: Provide a thread-affine memcached client facade in which every
//! worker thread owns exactly one lazily created backend handle.
//!
//! ## Design Principles
//! 1. **Thread Affinity**: Handles are created, used, and destroyed on a
//!    single thread, which removes locks and checkout/checkin bookkeeping.
//! 2. **Thin Delegation**: Protocol work and server selection belong to the
//!    backend client library; this crate is a dispatch layer.
//! 3. **Soft Failure**: Backend trouble degrades to miss or zero results so
//!    a host request path never crashes on cache problems.
//! 4. **Injected Configuration**: The server list is a constructor argument,
//!    removing any init-ordering requirement between configuration and use.

mod backend;
mod client;
mod config;
mod registry;

pub use backend::{
    Backend, BackendError, Capabilities, ConnectError, Connector, MemcacheConnector, Value,
};
pub use client::MemClient;
pub use config::{
    parse_host_port_list, ConfigError, ServerAddr, ServerConfig, ServerFormat, DEFAULT_PORT,
};
pub use registry::HandleId;
