//! Shared server state.

use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::relay::Relay;
use crate::sessions::SessionRegistry;
use crate::store::DocumentStore;

/// Shared state accessible from all handlers.
pub struct AppState {
    /// Single process-wide store handle shared by routes and the relay.
    pub store: Arc<dyn DocumentStore>,
    /// Live realtime sessions and room memberships.
    pub sessions: Arc<SessionRegistry>,
    pub relay: Relay,
    pub tokens: TokenKeys,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Arc<Self> {
        let sessions = SessionRegistry::new();
        let relay = Relay::new(Arc::clone(&store), Arc::clone(&sessions));
        let tokens = TokenKeys::new(config.token_secret.as_bytes(), config.token_ttl_secs);

        Arc::new(Self {
            store,
            sessions,
            relay,
            tokens,
            config,
        })
    }
}
