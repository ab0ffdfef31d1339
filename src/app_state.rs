use crate::config::Config;
use crate::db::MongoDB;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
    pub http_client: awc::Client,
}
