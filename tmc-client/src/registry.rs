//! # Thread-Affine Handle Registry
//!
//! Purpose: Give every worker thread exactly one lazily created backend
//! handle and release it when the thread terminates.
//!
//! ## Design Principles
//! 1. **Thread Ownership**: Each thread reads and writes only its own slot
//!    table, so the lookup path takes no locks.
//! 2. **Lazy Creation**: A handle is built on first use from the injected
//!    connector and reused for the remaining life of the thread.
//! 3. **Deterministic Teardown**: Slots live in thread-local storage whose
//!    destructor drops each handle exactly once at thread exit.
//! 4. **Soft Failure**: A failed creation logs a diagnostic and yields an
//!    absent handle; the failure is not cached, so the next call retries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{Backend, Connector};

// Monotonic ids keep distinct caches out of each other's slots, including
// across create/drop cycles of the cache itself.
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Per-thread slot table, keyed by owner id. Dropping it at thread exit
    // releases every handle this thread ever created.
    static SLOTS: RefCell<HashMap<u64, Rc<ThreadHandle>>> = RefCell::new(HashMap::new());
}

/// Identity of one backend handle, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A backend handle bound to the thread that created it.
pub(crate) struct ThreadHandle {
    id: HandleId,
    backend: Box<dyn Backend>,
}

impl ThreadHandle {
    pub(crate) fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

/// Hands out the calling thread's backend handle, creating it on first use.
pub(crate) struct HandleCache {
    owner: u64,
    connector: Box<dyn Connector>,
}

impl HandleCache {
    pub(crate) fn new(connector: Box<dyn Connector>) -> Self {
        HandleCache {
            owner: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            connector,
        }
    }

    /// Returns the calling thread's handle, or `None` when creation fails.
    ///
    /// At most one live handle exists per thread and cache; repeated calls
    /// on the same thread return the identical handle until the thread
    /// exits.
    pub(crate) fn handle(&self) -> Option<Rc<ThreadHandle>> {
        let existing = SLOTS.with(|slots| slots.borrow().get(&self.owner).cloned());
        if let Some(handle) = existing {
            return Some(handle);
        }

        // The borrow is released before connecting: handle creation may
        // block on DNS or TCP for a while.
        match self.connector.connect() {
            Ok(backend) => {
                let handle = Rc::new(ThreadHandle {
                    id: HandleId::next(),
                    backend,
                });
                SLOTS.with(|slots| {
                    slots.borrow_mut().insert(self.owner, Rc::clone(&handle));
                });
                Some(handle)
            }
            Err(err) => {
                tracing::warn!(error = %err, "backend handle creation failed");
                None
            }
        }
    }
}
