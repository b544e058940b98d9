use std::sync::Arc;

use crate::apps::AppRegistry;
use crate::configs::Config;
use crate::session::SessionRegistry;
use crate::sources::SourceSet;
use crate::voice::ws::WsVoiceBackend;

/// Top-level application state handed to the axum router.
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub voice: Arc<WsVoiceBackend>,
    pub sources: Arc<SourceSet>,
    pub apps: Arc<AppRegistry>,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
