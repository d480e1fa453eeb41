mod layers;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use crate::layers::catalog::ComicvineClient;
use crate::layers::source::{ComicvineSource, LookupConfig};
use crate::layers::{Query, ID_COMICVINE};

/// Look up comic issue metadata on Comicvine.
#[derive(Parser)]
#[command(name = "comicvine-meta")]
struct Cli {
    /// Query terms: t:<title>, a:<author>, i:<kind>:<id>
    #[arg(required = true)]
    terms: Vec<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Download covers for the best match into this directory
    #[arg(long, value_name = "DIR")]
    covers: Option<PathBuf>,

    /// Fetch every cover size, not just the best one
    #[arg(long, requires = "covers")]
    all_covers: bool,
}

fn parse_query(terms: &[String]) -> Result<Query> {
    let mut query = Query::default();
    for term in terms {
        if let Some(title) = term.strip_prefix("t:") {
            query.title = Some(title.to_string());
        } else if let Some(author) = term.strip_prefix("a:") {
            query.authors.push(author.to_string());
        } else if let Some(identifier) = term.strip_prefix("i:") {
            let (kind, value) = identifier
                .split_once(':')
                .context("identifier terms must look like i:<kind>:<id>")?;
            let value: u64 = value
                .parse()
                .with_context(|| format!("invalid identifier value in '{}'", term))?;
            query.identifiers.insert(kind.to_string(), value);
        } else {
            anyhow::bail!(
                "unrecognized query term '{}' (expected a t:, a: or i: prefix)",
                term
            );
        }
    }
    Ok(query)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 0. Load configuration
    dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let api_key = env::var("COMICVINE_API_KEY")
        .context("COMICVINE_API_KEY is not set (put it in .env or the environment)")?;
    let worker_threads = env::var("COMICVINE_WORKER_THREADS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(16);
    let timeout_secs = env::var("COMICVINE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let config = LookupConfig {
        api_key,
        worker_threads,
        timeout: Duration::from_secs(timeout_secs),
    };

    let query = parse_query(&cli.terms)?;

    // 1. Identify
    let catalog = ComicvineClient::new(config.api_key.clone(), config.timeout)?;
    let source = ComicvineSource::new(catalog, config.worker_threads);
    let results = source.identify(&query, config.timeout).await?;

    if results.is_empty() {
        println!("No matches found.");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        let pubdate = result
            .pubdate
            .map(|d| d.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        println!(
            "({:04}) - {}: {} [{}]",
            rank + 1,
            result.comicvine_id,
            result.title,
            pubdate
        );
    }

    // 2. Covers (optional)
    if let Some(dir) = cli.covers {
        let best = &results[0];
        let identifiers = HashMap::from([(ID_COMICVINE.to_string(), best.comicvine_id)]);
        let covers = source
            .download_cover(&identifiers, config.timeout, !cli.all_covers)
            .await?;
        if covers.is_empty() {
            println!("No covers available for Issue({}).", best.comicvine_id);
            return Ok(());
        }
        tokio::fs::create_dir_all(&dir).await?;
        for (index, (url, bytes)) in covers.iter().enumerate() {
            let path = dir.join(format!("cover-{:02}.jpg", index + 1));
            tokio::fs::write(&path, bytes).await?;
            println!("Saved {} to {:?}", url, path);
        }
    }

    Ok(())
}
