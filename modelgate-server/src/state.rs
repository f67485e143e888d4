//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use modelgate_core::gateway::Gateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway, started_at: Utc::now() }
    }
}
