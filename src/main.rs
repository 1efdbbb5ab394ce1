use clap::Parser;
use dray::cli::{render_agents_table, AgentLoadRow, Cli, Commands};
use dray::clock::SystemClock;
use dray::config::AppConfig;
use dray::dispatch::{Availability, BusyReason, DispatchEngine};
use dray::error::{DrayError, Result};
use dray::store::{AgentStore, PostgresStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Assign { order_ref } => {
            init_logging();
            run_assign(&cli, order_ref).await
        }
        Commands::Agents => {
            init_logging_simple();
            run_agents(&cli).await
        }
    }
}

async fn run_assign(cli: &Cli, order_ref: &str) -> Result<()> {
    let config = load_config(cli)?;
    let store = Arc::new(connect(&config).await?);
    let engine = build_engine(store, &config);

    let outcome = engine.assign(order_ref).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.message());
    }

    Ok(())
}

async fn run_agents(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let store = Arc::new(connect(&config).await?);
    let engine = build_engine(store.clone(), &config);

    let mut rows = Vec::new();
    for agent in store.all().await? {
        let (active, free) = match engine.evaluator().is_free(agent.id).await? {
            Availability::Free { active, .. } => (active, true),
            Availability::Busy(BusyReason::AtCapacity { active, .. }) => (active, false),
            Availability::Busy(BusyReason::AgentNotFound) => (0, false),
        };
        rows.push(AgentLoadRow {
            id: agent.id,
            name: agent.name,
            capacity: agent.capacity,
            active,
            free,
        });
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_agents_table(&rows));
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            info!("Using default configuration");
            AppConfig::default_config()
        }
    };

    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("Invalid configuration: {}", problem);
        }
        return Err(DrayError::Validation(errors.join("; ")));
    }

    Ok(config)
}

async fn connect(config: &AppConfig) -> Result<PostgresStore> {
    let store =
        match PostgresStore::new(&config.database.url, config.database.max_connections).await {
            Ok(store) => store,
            Err(e) => {
                error!("Database connection failed: {}", e);
                return Err(e);
            }
        };

    store.ensure_schema().await?;
    Ok(store)
}

fn build_engine(store: Arc<PostgresStore>, config: &AppConfig) -> DispatchEngine {
    DispatchEngine::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(SystemClock),
        &config.dispatch,
    )
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dray=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
