use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kce_ingest::{open_pipeline, IngestConfig, IngestRunSummary};
use kce_storage::{JobStore, StoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "kce-cli")]
#[command(about = "KierowcaCE job ingestion and query service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch the listing page (or read a saved one) and ingest it.
    Ingest {
        /// Saved listing page to ingest instead of fetching.
        #[arg(long)]
        from_file: Option<PathBuf>,
        #[arg(long)]
        source_url: Option<String>,
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Re-ingest every candidate of a raw record log.
    Replay {
        path: PathBuf,
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Create or upgrade the job table.
    Migrate {
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Run the query API and HTML views.
    Serve {
        #[arg(long, env = "KCE_WEB_PORT", default_value_t = 8000)]
        port: u16,
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Run ingestion on the configured cron schedule until Ctrl-C.
    Schedule,
}

#[derive(Debug, Default, Args)]
struct PathArgs {
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl PathArgs {
    fn apply(self, config: &mut IngestConfig) {
        if let Some(url) = self.database_url {
            config.store.database_url = url;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
    }
}

fn store_config(database_url: Option<String>) -> StoreConfig {
    let mut config = StoreConfig::from_env();
    if let Some(url) = database_url {
        config.database_url = url;
    }
    config
}

fn report(summary: &IngestRunSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    if !summary.is_success() {
        anyhow::bail!(
            "ingestion stopped early ({:?}): {}",
            summary.status,
            summary.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest {
        from_file: None,
        source_url: None,
        paths: PathArgs::default(),
    }) {
        Commands::Ingest {
            from_file,
            source_url,
            paths,
        } => {
            let mut config = IngestConfig::from_env();
            paths.apply(&mut config);
            if let Some(url) = source_url {
                config.source_url = url;
            }
            let pipeline = open_pipeline(&config).await?;
            let summary = match from_file {
                Some(path) => {
                    let markup = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?;
                    pipeline
                        .run_from_markup(&path.display().to_string(), &markup)
                        .await?
                }
                None => pipeline.run_once().await?,
            };
            report(&summary)?;
        }
        Commands::Replay { path, paths } => {
            let mut config = IngestConfig::from_env();
            paths.apply(&mut config);
            let pipeline = open_pipeline(&config).await?;
            let summary = pipeline.replay(&path).await?;
            report(&summary)?;
        }
        Commands::Migrate { database_url } => {
            let config = store_config(database_url);
            let store = JobStore::open(&config)
                .await
                .with_context(|| format!("migrating {}", config.database_url))?;
            tracing::info!(database_url = %config.database_url, jobs = store.count().await?, "schema up to date");
            store.close().await;
        }
        Commands::Serve { port, database_url } => {
            let store = JobStore::open(&store_config(database_url)).await?;
            kce_web::serve(store, port).await?;
        }
        Commands::Schedule => {
            let mut config = IngestConfig::from_env();
            config.scheduler_enabled = true;
            kce_ingest::run_scheduler_until_shutdown(&config).await?;
        }
    }

    Ok(())
}
