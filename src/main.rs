//! hireflow service entry point.

use clap::Parser;
use tracing::{error, info};

use hireflow::server;
use hireflow::{AppConfig, AppError, AppState};

/// Exit code for invalid configuration.
const EXIT_CONFIG: i32 = 2;
/// Exit code for fatal storage errors.
const EXIT_STORAGE: i32 = 3;

#[derive(Parser)]
#[command(name = "hireflow")]
#[command(about = "Interview turn orchestrator")]
struct Args {
    /// Address to bind, overriding BIND_ADDR
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hireflow=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(EXIT_CONFIG);
        }
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
        if let Err(e) = config.validate() {
            error!(error = %e, "invalid configuration");
            std::process::exit(EXIT_CONFIG);
        }
    }

    let state = match AppState::initialize(config.clone()) {
        Ok(state) => state,
        Err(e @ AppError::Storage(_)) => {
            error!(error = %e, "fatal storage error");
            std::process::exit(EXIT_STORAGE);
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(EXIT_CONFIG);
        }
    };

    hireflow::services::session::spawn_idle_sweeper(state.sessions.clone());

    let app = server::router(state);
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "cannot bind");
            std::process::exit(EXIT_CONFIG);
        }
    };
    info!(addr = %config.bind_addr, provider = ?config.llm.provider, "listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });

    if let Err(e) = serve.await {
        error!(error = %e, "server error");
        std::process::exit(EXIT_STORAGE);
    }
}
