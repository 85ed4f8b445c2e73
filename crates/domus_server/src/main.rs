use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use domus_adapter::{NullAdapter, ReasoningAdapter, RestAdapter, WsAdapter};
use domus_core::{AdapterKind, DomusConfig, EngineKind};
use domus_engine::Orchestrator;
use domus_gateway::{GatewayServer, SocketRegistry};
use domus_store::{provision, StudyStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Smart-home study backend", long_about = None)]
struct Args {
    /// Path to the TOML study configuration
    #[arg(short, long, default_value = "config/domus.toml", env = "DOMUS_CONFIG")]
    config: String,

    /// Session ids to provision at startup (repeatable)
    #[arg(short, long = "session")]
    sessions: Vec<String>,

    /// Override the gateway port from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = DomusConfig::load_or_default(&args.config);
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    let config = Arc::new(config);

    info!(
        engine = ?config.explanation.engine,
        trigger = ?config.explanation.trigger,
        tasks = config.study.tasks.len(),
        rules = config.study.rules.len(),
        "Study configuration loaded"
    );

    let store = Arc::new(StudyStore::new());
    let registry = Arc::new(SocketRegistry::new());

    // The external reasoning service only gets a live transport when the
    // config actually routes explanations through it.
    let mut callback_rx = None;
    let adapter: Arc<dyn ReasoningAdapter> = match config.explanation.engine {
        EngineKind::Integrated => Arc::new(NullAdapter),
        EngineKind::External => match config.explanation.adapter {
            AdapterKind::Rest => Arc::new(RestAdapter::new(&config.explanation.endpoint)?),
            AdapterKind::Websocket => {
                let (ws, rx) = WsAdapter::new(&config.explanation.endpoint)?;
                callback_rx = Some(rx);
                Arc::new(ws)
            }
        },
    };

    let orchestrator = Orchestrator::new(
        store.clone(),
        config.clone(),
        registry.clone(),
        adapter,
    );

    // Asynchronous explanations arriving over the adapter's callback
    // channel re-enter the normal delivery path.
    if let Some(mut rx) = callback_rx.take() {
        let router = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(callback) = rx.recv().await {
                if let Err(e) = router
                    .deliver_external(&callback.session_id, &callback.explanation)
                    .await
                {
                    warn!(session = %callback.session_id, "Callback delivery failed: {}", e);
                }
            }
        });
    }

    let session_ids = if args.sessions.is_empty() {
        vec![Uuid::new_v4().to_string()]
    } else {
        args.sessions.clone()
    };
    for session_id in &session_ids {
        provision::provision_session(&store, &config, session_id).await;
        info!(session = %session_id, "Session provisioned");
    }

    let server = GatewayServer::new(
        orchestrator,
        registry,
        &config.gateway.host,
        config.gateway.port,
    );
    let handle = server.start();
    info!(
        "Ready; clients connect to ws://{}:{}/ws",
        config.gateway.host, config.gateway.port
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
        _ = handle => {
            warn!("Gateway task ended unexpectedly");
        }
    }

    Ok(())
}
