//! Application state.

use std::sync::Arc;

use fingraph_arango::ArangoClient;
use fingraph_chats::ChatStore;
use fingraph_queue::{EventBus, JobStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<JobStore>,
    pub bus: Arc<EventBus>,
    pub graph: Arc<ArangoClient>,
    pub chats: Arc<ChatStore>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let jobs = JobStore::from_env()?;
        let bus = EventBus::from_env()?;
        let graph = ArangoClient::from_env()?;

        let chats_dir =
            std::env::var("CHATS_DIR").unwrap_or_else(|_| "chats".to_string());
        let chats = ChatStore::new(graph.clone(), chats_dir);

        Ok(Self {
            config,
            jobs: Arc::new(jobs),
            bus: Arc::new(bus),
            graph: Arc::new(graph),
            chats: Arc::new(chats),
        })
    }
}
