//! pokedex command-line entry point.
//!
//! Data goes to stdout as JSON lines; logging goes to stderr so output can be piped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pokedex_client::{CancelToken, CatalogClient, FetchError, ListCursor, WorkerPool};
use pokedex_core::AppConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pokedex")]
#[command(about = "Browse the Pokédex catalog with a local response cache")]
#[command(version)]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Skip the local cache for this run
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of the listing
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Load several pages in a row, deduplicated by name
    Browse {
        #[arg(long, default_value_t = 2)]
        pages: u32,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Look up one entry by name or id (Ctrl-C cancels)
    Detail { name: String },
    /// List the primary categories
    Types,
    /// Fetch every member of a category, printing each as it arrives
    Filter {
        category: String,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Delete every cached response
    ClearCache,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let mut config = AppConfig::load().context("failed to load configuration")?;
    if args.no_cache {
        config.cache_enabled = false;
    }

    let catalog = CatalogClient::from_config(&config).await.context("failed to build catalog client")?;

    match args.command {
        Command::List { limit, offset } => {
            let page = catalog.list(limit.unwrap_or(config.page_limit), offset).await?;
            for item in &page.results {
                println!("{}", serde_json::to_string(item)?);
            }
            tracing::info!(count = page.count, returned = page.results.len(), has_next = page.has_next(), "page fetched");
        }
        Command::Browse { pages, limit } => {
            let mut cursor = ListCursor::new(limit.unwrap_or(config.page_limit));
            for _ in 0..pages {
                if !cursor.has_next_page() {
                    break;
                }
                cursor.load_more(&catalog).await?;
            }
            for item in cursor.items() {
                println!("{}", serde_json::to_string(item)?);
            }
            tracing::info!(loaded = cursor.items().len(), total = ?cursor.total(), has_next = cursor.has_next_page(), "browse done");
        }
        Command::Detail { name } => {
            let token = CancelToken::new();
            let lookup = catalog.detail(&name, Some(token.clone()));
            let result = tokio::select! {
                result = lookup => result,
                _ = tokio::signal::ctrl_c() => {
                    token.cancel();
                    Err(FetchError::Cancelled { url: name.clone() })
                }
            };

            match result {
                Ok(pokemon) => println!("{}", serde_json::to_string_pretty(&pokemon)?),
                Err(e) if e.is_cancelled() => tracing::debug!("lookup cancelled"),
                Err(e) => return Err(e).with_context(|| format!("lookup of {name:?} failed")),
            }
        }
        Command::Types => {
            for category in catalog.categories().await? {
                println!("{}", category.name);
            }
        }
        Command::Filter { category, concurrency } => {
            let catalog = catalog.with_pool(WorkerPool::new(concurrency.unwrap_or(config.pool_concurrency)));
            let mut job = catalog.filter_by_category(&category).await?;
            let total = job.total();

            loop {
                tokio::select! {
                    next = job.next() => match next {
                        Some(pokemon) => println!("{}", serde_json::to_string(&pokemon)?),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("filter abandoned");
                        return Ok(());
                    }
                }
            }

            let (_, summary) = job.finish().await;
            tracing::info!(total, succeeded = summary.succeeded, failed = summary.failed.len(), "filter done");
        }
        Command::ClearCache => {
            catalog.clear_cache().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_filter() {
        let args = Args::parse_from(["pokedex", "filter", "fire", "--concurrency", "3"]);
        assert!(matches!(args.command, Command::Filter { ref category, concurrency: Some(3) } if category == "fire"));
    }

    #[test]
    fn test_args_global_flags() {
        let args = Args::parse_from(["pokedex", "list", "--limit", "50", "--no-cache", "--json"]);
        assert!(args.no_cache);
        assert!(args.json);
        assert!(matches!(args.command, Command::List { limit: Some(50), offset: 0 }));
    }

    #[test]
    fn test_args_clear_cache() {
        let args = Args::parse_from(["pokedex", "clear-cache"]);
        assert!(matches!(args.command, Command::ClearCache));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
