//! wicket - access-control gateway for user identity records

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wicket::{config::Args, db::MongoStore, server, server::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wicket={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  wicket - user identity gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Users collection: {}", args.users_collection);
    info!("Admin role: {}", args.admin_role);
    info!(
        "Login length: {}-{}",
        args.login_min_len, args.login_max_len
    );
    info!("Restricted search: {}", args.restricted_search);
    info!("======================================");

    // Connect to MongoDB; the unique login index is applied here.
    let store = match MongoStore::connect(
        &args.mongodb_uri,
        &args.mongodb_db,
        &args.users_collection,
    )
    .await
    {
        Ok(store) => {
            info!("MongoDB connected successfully");
            store
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(args, Arc::new(store)));
    server::run(state).await
}
