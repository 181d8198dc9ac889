use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zenfit::config::Config;
use zenfit::db::{AppState, EntitlementStore};
use zenfit::handlers;
use zenfit::models::{Feature, SubscriptionTier};
use zenfit::policy::Entitlements;
use zenfit::provider::SandboxProvider;
use zenfit::session::PurchaseSession;

#[derive(Parser, Debug)]
#[command(name = "zenfit")]
#[command(about = "Subscription entitlements and daily quotas for ZenFit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the local entitlement API (default)
    Serve,
    /// Print the current entitlement and today's usage
    Status,
    /// Grant a tier without the purchase provider (dev mode only)
    Simulate {
        /// free, premium_monthly, premium_yearly, premium_plus_monthly, premium_plus_yearly
        tier: SubscriptionTier,
    },
    /// Record one completed use of a metered feature
    Consume {
        /// workout or meditation
        feature: Feature,
    },
    /// Zero today's usage counters
    ResetUsage,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zenfit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let store = EntitlementStore::open(&config.database_path)
        .expect("Failed to open entitlement database");

    // Only the sandbox provider ships with the binary; embedders bring their own
    let provider = Arc::new(SandboxProvider::new());
    let session = Arc::new(PurchaseSession::new(provider, store.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, session).await,
        Command::Status => print_status(&Entitlements::new(store)),
        Command::Simulate { tier } => {
            if !config.dev_mode {
                tracing::warn!("simulate ignored: not in dev mode (set ZENFIT_ENV=dev)");
                return;
            }
            match session.simulate_purchase(tier) {
                Ok(record) => tracing::info!("Simulated {} (expires {:?})", tier, record.expires_at),
                Err(e) => tracing::error!("Simulated purchase failed: {}", e),
            }
        }
        Command::Consume { feature } => {
            let entitlements = Entitlements::new(store);
            if !entitlements.can_consume(feature) {
                tracing::warn!("Daily {} limit reached", feature.as_ref());
                return;
            }
            match entitlements.consume(feature) {
                Ok(count) => tracing::info!("{} count today: {}", feature.as_ref(), count),
                Err(e) => tracing::error!("Failed to record usage: {}", e),
            }
        }
        Command::ResetUsage => match Entitlements::new(store).reset_daily_limits() {
            Ok(()) => tracing::info!("Usage counters reset"),
            Err(e) => tracing::error!("Failed to reset usage: {}", e),
        },
    }
}

fn print_status(entitlements: &Entitlements) {
    let record = entitlements.store().read();
    println!("tier:          {}", record.tier);
    println!("effective:     {}", entitlements.current_tier());
    println!("access level:  {}", entitlements.current_access_level().as_ref());
    if let Some(expires_at) = record.expires_at {
        println!("expires at:    {}", expires_at);
    }
    for feature in [Feature::Workout, Feature::Meditation] {
        let report = entitlements.usage_report(feature);
        let limit = report
            .limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!("{:<14} {}/{}", format!("{}:", feature.as_ref()), report.used, limit);
    }
}

async fn serve(config: &Config, session: Arc<PurchaseSession>) {
    let state = AppState::new(session.clone());

    if let Err(e) = session.start() {
        tracing::warn!("Purchase session did not start: {}", e);
    }

    let mut app = Router::new().merge(handlers::router());

    if config.dev_mode {
        app = app.merge(handlers::dev_router());
        tracing::info!("DEV endpoints enabled: POST /dev/simulate-purchase");
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("ZenFit entitlement server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    session.stop();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
