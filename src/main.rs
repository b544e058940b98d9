use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use soapbox::apps::{AppDeps, AppRegistry};
use soapbox::common::ids::clean_workspaces;
use soapbox::common::logger;
use soapbox::configs::Config;
use soapbox::log_println;
use soapbox::server::AppState;
use soapbox::session::SessionRegistry;
use soapbox::sources::SourceSet;
use soapbox::speech::SpeechStack;
use soapbox::transport;
use soapbox::voice::ws::WsVoiceBackend;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(Config::load()?);
    log_println!(
        "soapbox {} ({}@{})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_BRANCH").unwrap_or("unknown"),
        option_env!("GIT_COMMIT").map(|c| &c[..c.len().min(7)]).unwrap_or("unknown")
    );
    logger::init(&config);

    let swept = clean_workspaces(&config.audio.workspace_root())?;
    if swept > 0 {
        info!("Removed {} leftover workspace directories", swept);
    }

    let voice = Arc::new(WsVoiceBackend::new());
    let sources = Arc::new(SourceSet::new(&config));
    let speech = match &config.speech {
        Some(speech_config) => Some(Arc::new(SpeechStack::remote(speech_config)?)),
        None => None,
    };
    let apps = Arc::new(AppRegistry::builtin(&config));
    let deps = Arc::new(AppDeps {
        config: config.clone(),
        sources: sources.clone(),
        speech,
    });
    let registry = Arc::new(SessionRegistry::new(voice.clone(), apps.clone(), deps));

    let state = Arc::new(AppState {
        config: config.clone(),
        registry: registry.clone(),
        voice,
        sources,
        apps,
    });
    let app = transport::router(state);

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", address);

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    registry.shutdown().await;
    Ok(())
}
