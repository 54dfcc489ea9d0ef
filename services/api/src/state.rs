//! Application state shared across handlers

use std::sync::Arc;

use crate::{
    config::ApiConfig, middleware::AdminSessions, store::SessionStore,
    validation::ValidationGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub gateway: ValidationGateway,
    pub admin: AdminSessions,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(config: ApiConfig, gateway: ValidationGateway) -> Self {
        Self {
            store: SessionStore::new(config.sessions_dir.clone()),
            gateway,
            admin: AdminSessions::new(config.admin_session_ttl()),
            config: Arc::new(config),
        }
    }
}
