use log::{error, info, warn};
use std::net::SocketAddr;

use prompter_relay::config::RelayConfig;
use prompter_relay::core::server::{create_relay_server, SharedRelayServer};
use prompter_relay::handlers::routes;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Load config from the environment
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, queue_capacity={}, overflow_policy={}, tls={}",
        config.host, config.port, config.queue_capacity, config.overflow_policy, config.enable_tls
    );

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let relay = create_relay_server(config.clone());
    let routes = routes(relay.clone());

    info!("Starting prompter relay on {}", addr);

    if config.enable_tls {
        let (cert_path, key_path) = match (&config.tls_cert_path, &config.tls_key_path) {
            (Some(cert), Some(key)) => (cert.clone(), key.clone()),
            _ => {
                error!("TLS enabled without certificate and key paths");
                std::process::exit(1);
            }
        };
        let (bound, server) = warp::serve(routes)
            .tls()
            .cert_path(cert_path)
            .key_path(key_path)
            .bind_with_graceful_shutdown(addr, shutdown_signal(relay));
        info!("Listening with TLS on {}", bound);
        server.await;
    } else {
        match warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown_signal(relay)) {
            Ok((bound, server)) => {
                info!("Listening on {}", bound);
                server.await;
            }
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                std::process::exit(1);
            }
        }
    }

    info!("Prompter relay stopped");
}

// Resolves on Ctrl-C after closing every client connection
async fn shutdown_signal(relay: SharedRelayServer) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    relay.shutdown().await;
}
