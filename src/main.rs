use anyhow::Context;
use clap::{Parser, Subcommand};
use kiosk_search::{
    config::Config,
    db::{ConnectionPool, RecordStore},
    models::{Record, RecordKind, SearchFilters, SearchOptions, SortDirection, SortField},
    orchestrator::{EnhancedSearchManager, SearchComponents},
    query::QueryBuilder,
    AppError,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "kiosk-search")]
#[command(about = "Search and maintain the kiosk archive", long_about = None, version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "KIOSK_SEARCH_CONFIG")]
    config: Option<String>,

    /// Override the database path from the configuration
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every record kind
    Search {
        query: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,

        #[arg(long)]
        year_from: Option<i32>,

        #[arg(long)]
        year_to: Option<i32>,

        #[arg(long)]
        decade: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        publication_type: Option<String>,

        #[arg(long)]
        collection: Option<String>,

        #[arg(long)]
        role: Option<String>,

        /// Repeat for several tags; any one matches
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// relevance, name, date or year
        #[arg(short, long, default_value = "relevance")]
        sort: SortField,

        #[arg(long)]
        ascending: bool,

        /// Fail instead of serving substring fallback results
        #[arg(long)]
        no_fallback: bool,
    },

    /// Complete a title or name prefix
    Suggest {
        prefix: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Compare index and base-table counts per kind
    Verify,

    /// Drop and recreate full-text indexes
    Rebuild {
        /// Kinds to rebuild; all when omitted
        #[arg(short, long = "kind")]
        kinds: Vec<RecordKind>,
    },

    /// Rebuild every kind that fails verification
    Repair,

    /// Merge index segments
    Optimize,

    /// Print health, recovery, pool and cache diagnostics
    Health,

    /// Print Prometheus metrics gathered by this process
    Metrics,

    /// Write a snapshot of the whole store
    Export { output: PathBuf },

    /// Replace the store with a snapshot
    ImportSnapshot { input: PathBuf },

    /// Import records from a JSON array
    Seed { file: PathBuf },
}

fn init_tracing(json: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("kiosk_search={}", level).into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    init_tracing(
        cli.json_logs || config.observability.json_logs,
        &config.observability.log_level,
    );
    tracing::info!("Starting kiosk-search v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.prometheus_enabled {
        if let Err(e) = kiosk_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let pool = ConnectionPool::open(config.connection_manager(), config.pool_config())
        .await
        .context("failed to open the database")?;
    let components = SearchComponents::new(
        pool.clone(),
        QueryBuilder::new(config.query_config()),
        config.search_config(),
    )?;
    let manager = EnhancedSearchManager::new(
        components,
        config.orchestrator_config(),
        config.circuit_breaker_config(),
        config.monitor_config(),
    )?;

    let outcome = run(cli.command, &manager, &pool).await;
    manager.shutdown();
    outcome
}

async fn run(
    command: Commands,
    manager: &EnhancedSearchManager,
    pool: &ConnectionPool,
) -> anyhow::Result<()> {
    match command {
        Commands::Search {
            query,
            limit,
            offset,
            year_from,
            year_to,
            decade,
            department,
            publication_type,
            collection,
            role,
            tags,
            sort,
            ascending,
            no_fallback,
        } => {
            let mut filters = SearchFilters::new();
            if year_from.is_some() || year_to.is_some() {
                filters = filters.with_year_range(
                    year_from.unwrap_or(i32::MIN),
                    year_to.unwrap_or(i32::MAX),
                );
            }
            filters.decade = decade;
            filters.department = department;
            filters.publication_type = publication_type;
            filters.collection = collection;
            filters.role = role;
            if !tags.is_empty() {
                filters = filters.with_tags(tags);
            }

            let direction = if ascending {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            };
            let mut options = SearchOptions::new()
                .with_limit(limit)
                .with_offset(offset)
                .with_sort(sort, direction);
            if no_fallback {
                options = options.without_fallback();
            }

            match manager.search_all(&query, &filters, &options).await {
                Ok(response) => print_json(&response)?,
                Err(AppError::Search(e)) => {
                    eprintln!("{}", e.user_message());
                    anyhow::bail!(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Suggest { prefix, limit } => {
            for suggestion in manager.get_search_suggestions(&prefix, limit).await {
                println!("{}", suggestion);
            }
        }
        Commands::Verify => print_json(&manager.verify_integrity().await?)?,
        Commands::Rebuild { kinds } => {
            let kinds = if kinds.is_empty() { None } else { Some(kinds) };
            manager.rebuild_indexes(kinds).await?;
            print_json(&manager.verify_integrity().await?)?;
        }
        Commands::Repair => {
            for action in manager.repair_corrupted_indexes().await? {
                println!("{}", action);
            }
        }
        Commands::Optimize => print_json(&manager.optimize_indexes().await?)?,
        Commands::Health => {
            print_json(&serde_json::json!({
                "health": manager.get_health_status(),
                "recovery": manager.get_recovery_status(),
                "breaker": manager.get_breaker_stats(),
                "pool": manager.get_pool_metrics(),
                "caches": manager.get_cache_stats(),
                "performance": manager.get_performance_metrics(),
            }))?;
        }
        Commands::Metrics => print!("{}", kiosk_search::metrics::gather_metrics()),
        Commands::Export { output } => {
            let bytes = manager.export_snapshot().await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
        }
        Commands::ImportSnapshot { input } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            manager.restore_snapshot(bytes).await?;
            println!("restored snapshot from {}", input.display());
        }
        Commands::Seed { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records: Vec<Record> = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array of records", file.display()))?;
            let summary = RecordStore::new(pool.clone()).import(records).await?;
            manager.clear_caches().await;
            print_json(&summary)?;
        }
    }
    Ok(())
}
