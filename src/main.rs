use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spider::{config, crawl, migrate, search};

#[derive(Parser)]
#[command(
    name = "spider",
    version,
    about = "Crawl document repositories into a full text search index"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "./spider.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Crawl one configured repo
    Crawl {
        /// Name of the repo to crawl
        repo: String,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Abort the whole run on the first document error
        #[arg(long)]
        fatal_errors: bool,
    },

    /// Query the index
    Search {
        query: String,

        /// Result page, counted from 0
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spider=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Crawl {
            repo,
            workers,
            fatal_errors,
        } => {
            if let Some(workers) = workers {
                if workers == 0 {
                    anyhow::bail!("--workers must be > 0");
                }
                config.crawl.workers = Some(workers);
            }
            if fatal_errors {
                config.crawl.fatal_errors = true;
            }
            let summary = crawl::run_crawl(&config, &repo).await?;
            println!("Crawl of '{repo}' complete: {summary}");
        }
        Commands::Search { query, page } => {
            let hits = search::run_search(&config, &query, page).await?;
            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for hit in hits {
                let when = chrono::DateTime::from_timestamp(hit.mtime, 0)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                match &hit.url {
                    Some(url) => println!("{} ({when})\n  {}\n  {}\n", hit.name, url, hit.snippet),
                    None => println!("{} ({when})\n  {}\n", hit.name, hit.snippet),
                }
            }
        }
    }

    Ok(())
}
