//! Socket path -> client registry
//!
//! Providers constructed for the same path share one client, and so one
//! live connection. Entries are never removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::ipc::{ClientOptions, IpcClient};

type ClientFactory<C> = Box<dyn Fn(&str) -> C + Send + Sync>;

/// Registry holding at most one client per socket path
pub struct ClientRegistry<C> {
    factory: ClientFactory<C>,
    clients: Mutex<HashMap<String, Arc<C>>>,
}

impl<C> ClientRegistry<C> {
    /// Create an empty registry building clients with `factory`
    pub fn new(factory: impl Fn(&str) -> C + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get the client for `path`, creating it on first use
    pub fn client(&self, path: &str) -> Arc<C> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(path) {
            return Arc::clone(client);
        }

        tracing::debug!("Creating IPC client for {}", path);
        let client = Arc::new((self.factory)(path));
        clients.insert(path.to_string(), Arc::clone(&client));
        client
    }

    pub fn contains(&self, path: &str) -> bool {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClientRegistry<IpcClient> {
    /// Registry of IPC clients with auto-reconnect disabled
    pub fn ipc(options: ClientOptions) -> Self {
        Self::new(move |path| {
            IpcClient::new(
                path,
                ClientOptions {
                    auto_reconnect: false,
                    ..options.clone()
                },
            )
        })
    }

    /// The process-wide registry used by [`IpcProvider::new`](super::IpcProvider::new)
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ClientRegistry<IpcClient>> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::ipc(ClientOptions::default()))
    }
}
