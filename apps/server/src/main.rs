use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_config::load as load_config;
use parley_gateway::{create_router, GatewayState};
use parley_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "Parley realtime chat backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Zero every user's text-filter token usage
    ResetUsage,
    /// Mint a session token for an existing user
    IssueSession {
        user_id: String,
        /// Lifetime of the session in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::ResetUsage => reset_usage().await,
        Commands::IssueSession { user_id, ttl_hours } => issue_session(&user_id, ttl_hours).await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting Parley backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let app = create_router(GatewayState::new(services.hub.clone()));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    // Upgraded sockets are not tracked by graceful shutdown; the hub ends them.
    let draining = services.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            parley_runtime::shutdown_signal().await;
            draining.shutdown().await;
        })
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

async fn reset_usage() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let pool = BackendServices::open_database(&config).await?;

    let reset = parley_runtime::reset_usage(&pool).await?;
    pool.close().await;

    println!("Reset token usage for {reset} users");
    Ok(())
}

async fn issue_session(user_id: &str, ttl_hours: i64) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let pool = BackendServices::open_database(&config).await?;

    let session = parley_runtime::issue_session(&pool, user_id, chrono::Duration::hours(ttl_hours))
        .await?;
    pool.close().await;

    println!("{}", session.token);
    println!("expires at {}", session.expires_at.to_rfc3339());
    Ok(())
}
