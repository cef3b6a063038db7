use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::BroadcastDispatcher;
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(
            BroadcastDispatcher::new(connection_manager.clone())
                .with_echo_to_sender(settings.broadcast.echo_to_sender),
        );

        Self {
            settings: Arc::new(settings),
            connection_manager,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}
