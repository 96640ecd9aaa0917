use std::sync::Arc;

use ogproxy_client::CacheAside;
use ogproxy_core::AppConfig;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub cacher: Arc<CacheAside>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(cacher: CacheAside, config: AppConfig) -> Self {
        Self { cacher: Arc::new(cacher), config: Arc::new(config) }
    }
}
