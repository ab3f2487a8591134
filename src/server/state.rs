use std::sync::Arc;
use std::time::Instant;

use crate::auth::{ConnectionAuthenticator, StaticUserDirectory, UserDirectory};
use crate::config::Settings;
use crate::events::EventRouter;
use crate::hub::ConnectionHub;
use crate::store::{MemoryMessageStore, MessageStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub authenticator: Arc<ConnectionAuthenticator>,
    pub router: Arc<EventRouter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let authenticator = Arc::new(ConnectionAuthenticator::new(&settings.auth, directory));
        let router = Arc::new(EventRouter::new(hub, store));

        Self {
            settings: Arc::new(settings),
            authenticator,
            router,
            started_at: Instant::now(),
        }
    }

    /// State with in-memory collaborators, for development and tests.
    pub fn in_memory(settings: Settings, directory: StaticUserDirectory) -> Self {
        Self::new(
            settings,
            Arc::new(MemoryMessageStore::new()),
            Arc::new(directory),
        )
    }
}
