use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tr_domain::config::{Config, ConfigSeverity, ServerConfig};
use tr_gateway::api;
use tr_gateway::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = tr_gateway::cli::load_config()?;
            run_server(config).await
        }
        Some(Command::Version) => {
            println!("trackerd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tr_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("trackerd starting");

    let issues = config.validate();
    let mut hard_error = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => {
                tracing::error!("config: {issue}");
                hard_error = true;
            }
        }
    }
    if hard_error {
        anyhow::bail!("configuration has {} error(s), refusing to start", issues.len());
    }

    let state = tr_gateway::bootstrap::build_app_state(&config)
        .await
        .context("building application state")?;

    let tracker_app = api::tracker::router()
        .with_state(state.clone())
        .layer(build_cors_layer(&config.tracker_server))
        .layer(TraceLayer::new_for_http());
    let supervisor_app = api::supervisor::router()
        .with_state(state)
        .layer(build_cors_layer(&config.supervisor_server))
        .layer(TraceLayer::new_for_http());

    let tracker_addr = format!("{}:{}", config.tracker_server.host, config.tracker_server.port);
    let supervisor_addr = format!(
        "{}:{}",
        config.supervisor_server.host, config.supervisor_server.port
    );

    let tracker_listener = tokio::net::TcpListener::bind(&tracker_addr)
        .await
        .with_context(|| format!("binding tracker server on {tracker_addr}"))?;
    tracing::info!(addr = %tracker_addr, "tracker HTTP surface listening");

    let supervisor_listener = tokio::net::TcpListener::bind(&supervisor_addr)
        .await
        .with_context(|| format!("binding supervisor server on {supervisor_addr}"))?;
    tracing::info!(addr = %supervisor_addr, "tool run supervisor HTTP surface listening");

    let tracker_serve = axum::serve(tracker_listener, tracker_app);
    let supervisor_serve = axum::serve(supervisor_listener, supervisor_app);

    tokio::try_join!(
        async { tracker_serve.await.context("tracker server") },
        async { supervisor_serve.await.context("supervisor server") },
    )?;

    Ok(())
}

fn build_cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = server
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
