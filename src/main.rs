use std::sync::Arc;

use alerthub::{
    alerts::{AlertHub, LocalEventBus, MemoryQueue, MembershipListener, QueueBridge, StaticRoleDirectory},
    arguments::{self, enabled_debug_modes},
    config,
    errors::{AlertError, AlertResult},
    hub::Hub,
    logger::{self, LogTag},
    webserver::{self, AppState},
};
use tokio_util::sync::CancellationToken;

/// Main entry point for the alert hub
///
/// - Parses arguments and loads the TOML config
/// - Wires the Hub, alert adapter, queue bridge and membership listener
/// - Serves the upgrade endpoint until Ctrl-C, then closes every connection
#[tokio::main]
async fn main() {
    let args = arguments::init_from_env();
    logger::init();

    logger::info(LogTag::System, "Alert hub starting up...");
    let debug_modes = enabled_debug_modes();
    if !debug_modes.is_empty() {
        logger::info(
            LogTag::System,
            &format!("Debug modes enabled: {}", debug_modes.join(", ")),
        );
    }

    if let Err(e) = config::load_config_from_path(&args.config) {
        logger::error(LogTag::Config, &format!("Failed to load config: {}", e));
        std::process::exit(1);
    }

    match run().await {
        Ok(()) => logger::info(LogTag::System, "Alert hub stopped"),
        Err(e) => {
            logger::error(LogTag::System, &format!("Alert hub failed: {}", e));
            std::process::exit(1);
        }
    }
}

async fn run() -> AlertResult<()> {
    let config = config::get_config_clone();
    let shutdown = CancellationToken::new();

    // In-process collaborators; external systems plug in through the same traits
    let directory = StaticRoleDirectory::from_seed(&config.membership.seed);
    let bus = LocalEventBus::new();
    let queue = MemoryQueue::new();

    let hub = Hub::new();
    let alerts = Arc::new(AlertHub::new(Arc::clone(&hub), directory));

    MembershipListener::new(Arc::clone(&alerts), config.membership.clone()).register(bus.as_ref());

    let bridge = QueueBridge::new(Arc::clone(&alerts), queue, config.queue.alert_queue.clone())
        .start()
        .await?;
    let bridge_task = tokio::spawn(bridge.run(shutdown.clone()));

    let state = Arc::new(AppState::new(
        Arc::clone(&alerts),
        config.webserver.clone(),
        &config.websocket,
        shutdown.clone(),
    ));
    let listener = webserver::bind(&state).await?;
    let server_task = tokio::spawn(webserver::serve(listener, state));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AlertError::Server(format!("Failed to listen for Ctrl-C: {}", e)))?;
    logger::info(LogTag::System, "Shutdown requested, closing connections...");

    shutdown.cancel();
    let closed = hub.close_all();
    logger::info(LogTag::System, &format!("Closed {} live connection(s)", closed));

    if let Err(e) = bridge_task.await {
        logger::error(LogTag::Bridge, &format!("Bridge task failed: {}", e));
    }
    match server_task.await {
        Ok(result) => result?,
        Err(e) => logger::error(LogTag::Webserver, &format!("Server task failed: {}", e)),
    }
    Ok(())
}
