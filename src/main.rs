//! minorm - command-line entry point.
//!
//! Runs ad-hoc statements through the pool, mostly to check configuration.

use clap::Parser;
use minorm::config::{Command, Config};
use minorm::db::ConnectionPool;
use minorm::error::DbError;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr so stdout stays clean for query output
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config) -> Result<(), DbError> {
    let pool_config = config.pool_config()?.ok_or_else(|| {
        DbError::configuration(format!(
            "no database configured: pass --database-url, set MINORM_* variables or create {}",
            config.env_file.display()
        ))
    })?;
    let pool = ConnectionPool::new(pool_config);

    match &config.command {
        Command::Ping => {
            let mut conn = pool.acquire().await?;
            let rows = conn.select("SELECT 1 AS ok").await?;
            info!(connection_id = conn.id(), driver = %conn.database_type(), "Ping succeeded");
            conn.release().await?;
            let out =
                serde_json::to_string(&rows).map_err(|e| DbError::internal(e.to_string()))?;
            println!("{}", out);
        }
        Command::Select { sql } => {
            let sql = sql.clone();
            let rows = pool
                .acquire()
                .await?
                .scoped(move |c| Box::pin(async move { c.select(&sql).await }))
                .await?;
            let out = serde_json::to_string_pretty(&rows)
                .map_err(|e| DbError::internal(e.to_string()))?;
            println!("{}", out);
        }
        Command::Execute { sql } => {
            let sql = sql.clone();
            let affected = pool
                .acquire()
                .await?
                .scoped(move |c| Box::pin(async move { c.execute(&sql).await }))
                .await?;
            println!("{}", affected);
        }
    }

    pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting minorm v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        if let Some(hint) = e.suggestion() {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}
