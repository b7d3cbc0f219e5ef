// src/main.rs

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use kindred::config::CONFIG;
use kindred::engagement::eligibility::ThreadRngChance;
use kindred::llm::LlmContentEngine;
use kindred::state::AppState;
use kindred::tasks::config::TaskConfig;
use kindred::tasks::TaskManager;
use kindred::{db, server};

#[derive(Parser, Debug)]
#[command(name = "kindred", about = "Engagement scheduler for AI companions")]
struct Args {
    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = CONFIG.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting kindred");
    info!("Model: {}", CONFIG.llm_model);

    let database_url = args
        .database_url
        .unwrap_or_else(|| CONFIG.database_url.clone());
    let pool = db::connect(&database_url, CONFIG.sqlite_max_connections).await?;
    db::migration::run_migrations(&pool).await?;
    info!("Database ready at {}", database_url);

    let content_engine = Arc::new(LlmContentEngine::new()?);
    let task_config = TaskConfig::from_env();
    let app_state = AppState::assemble(
        pool,
        content_engine,
        Arc::new(ThreadRngChance),
        task_config.worker_limit,
    );

    // Start the schedulers
    let mut task_manager = TaskManager::new(app_state.clone());
    task_manager.start();

    // HTTP surface
    let app = server::create_router(app_state);
    let host = args.host.unwrap_or_else(|| CONFIG.host.clone());
    let port = args.port.unwrap_or(CONFIG.port);
    let bind_address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    task_manager.shutdown();
    Ok(())
}
