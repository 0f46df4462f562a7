use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_thread_monitor::config::Config;
use forum_thread_monitor::forum;
use forum_thread_monitor::report::summary_line;
use forum_thread_monitor::state::ScrapeState;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        base_url = %config.base_url,
        section = config.section_id,
        state = %config.state_path.display(),
        "Configuration loaded"
    );

    let client = forum::build_client(&config)?;
    let mut state = ScrapeState::load(&config.state_path).await;

    // A failed scan leaves the state file untouched.
    let report = forum::scan(&client, &config, &mut state).await?;

    state
        .save(&config.state_path)
        .await
        .context("Failed to persist scrape state")?;

    print!("{report}");
    println!();
    println!("{}", summary_line(&state, &config.state_path));

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forum_thread_monitor=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr; stdout carries the report.
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
