//! Registry of open pages and the worker version controlling each

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Unique identifier for an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

#[derive(Default)]
struct ClientTable {
    next_id: u64,
    /// Controlling worker version, if any
    controllers: HashMap<ClientId, Option<String>>,
}

/// Shared client registry. Clones see the same table.
#[derive(Clone, Default)]
pub struct Clients {
    table: Arc<Mutex<ClientTable>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut ClientTable) -> T) -> T {
        f(&mut self.table.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a page. It starts uncontrolled.
    pub fn register(&self) -> ClientId {
        self.with(|t| {
            t.next_id += 1;
            let id = ClientId(t.next_id);
            t.controllers.insert(id, None);
            debug!("Registered {}", id);
            id
        })
    }

    /// Forget a closed page
    pub fn unregister(&self, id: ClientId) -> bool {
        self.with(|t| t.controllers.remove(&id).is_some())
    }

    /// Worker version controlling `id`
    pub fn controller(&self, id: ClientId) -> Option<String> {
        self.with(|t| t.controllers.get(&id).cloned().flatten())
    }

    /// Make `version` the controller of every registered page. Returns the
    /// number of pages whose controller changed.
    pub fn claim(&self, version: &str) -> usize {
        self.with(|t| {
            let mut claimed = 0;
            for controller in t.controllers.values_mut() {
                if controller.as_deref() != Some(version) {
                    *controller = Some(version.to_string());
                    claimed += 1;
                }
            }
            claimed
        })
    }

    /// Pages controlled by `version`
    pub fn controlled_by(&self, version: &str) -> usize {
        self.with(|t| {
            t.controllers
                .values()
                .filter(|c| c.as_deref() == Some(version))
                .count()
        })
    }

    pub fn len(&self) -> usize {
        self.with(|t| t.controllers.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
