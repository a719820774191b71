//! Shared application state (§2)
//!
//! One instance, built once by `main.rs`'s composition root and cloned
//! (cheaply — every field is an `Arc`) into each axum handler, mirroring
//! the teacher's `AppState` shape.

use std::sync::Arc;

use parking_lot::RwLock;
use vts_gateway_config::Settings;

use crate::connection_manager::ConnectionManager;
use crate::router::MessageRouter;
use crate::sink::WsSinkRegistry;
use vts_gateway_asr::AsrSessionPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub connections: Arc<ConnectionManager>,
    pub asr: Arc<AsrSessionPool>,
    pub router: Arc<MessageRouter>,
    pub sinks: Arc<WsSinkRegistry>,
}

impl AppState {
    pub fn new(
        config: Settings,
        connections: Arc<ConnectionManager>,
        asr: Arc<AsrSessionPool>,
        router: Arc<MessageRouter>,
        sinks: Arc<WsSinkRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            connections,
            asr,
            router,
            sinks,
        }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
