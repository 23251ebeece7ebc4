//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::room::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let rooms = Arc::new(RoomRegistry::new(config.clone()));
        Self { config, rooms }
    }
}
