use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jiff::civil::Date;
use mediascrape::{
    common::Kind,
    filter::Filters,
    net::{FetchConfig, Fetcher},
    pipeline::{self, PipelineConfig, RunSummary},
    scraper::{GoodreadsSource, ImdbEnricher, WikipediaSource},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
/// Scrapes TV shows or books, filters them, and folds the result into a sorted
/// CSV that accumulates across runs.
///
/// Previously written rows are kept even when a later scrape no longer sees
/// them; rows seen again are replaced by the newer version.
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output CSV. Defaults to output/<tv|books>.csv
    #[arg(long, short, global = true)]
    out: Option<PathBuf>,

    /// Lookup cache file for rating enrichment
    #[arg(long, global = true, default_value = "cache/lookup_cache.json")]
    cache: PathBuf,

    /// Cached lookups older than this many days are refreshed
    #[arg(long, global = true, default_value_t = 21)]
    max_age_days: u32,

    /// Also write an added/updated/removed report as JSON
    #[arg(long, global = true, value_name = "PATH")]
    changelog: Option<PathBuf>,

    /// Minimum delay between requests, in milliseconds
    #[arg(long, global = true, default_value_t = 1500)]
    delay_ms: u64,

    /// Retries per request after the first attempt
    #[arg(long, global = true, default_value_t = 3)]
    retries: u32,

    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Drop rows rated below this. Rows without a numeric rating are kept
    #[arg(long, global = true)]
    min_rating: Option<f64>,

    /// Drop rows with fewer votes than this
    #[arg(long, global = true)]
    min_votes: Option<u64>,

    /// Earliest premiere/publication date to keep.
    ///
    /// Format: YYYY-MM-DD
    #[arg(long, global = true)]
    since: Option<Date>,

    /// Latest premiere/publication date to keep.
    ///
    /// Format: YYYY-MM-DD
    #[arg(long, global = true)]
    until: Option<Date>,

    /// Keep only rows whose genre contains one of these (repeatable)
    #[arg(long = "only-genre", global = true, value_name = "GENRE")]
    genres: Vec<String>,

    /// Keep only rows whose network/author contains one of these (repeatable)
    #[arg(long = "only-group", global = true, value_name = "NAME")]
    groups: Vec<String>,
}

impl TryFrom<FilterArgs> for Filters {
    type Error = anyhow::Error;

    fn try_from(args: FilterArgs) -> Result<Self> {
        if let (Some(since), Some(until)) = (args.since, args.until) {
            if since > until {
                bail!("--since {} is after --until {}", since, until);
            }
        }
        Ok(Filters {
            min_rating: args.min_rating,
            min_votes: args.min_votes,
            since: args.since,
            until: args.until,
            genres: args.genres,
            networks: args.groups,
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Shows from Wikipedia list pages, rated through IMDb
    Tv {
        /// Wikipedia page titles, e.g. "List of Netflix original programming"
        #[arg(required = true)]
        pages: Vec<String>,

        /// Network for tables that have no network column
        #[arg(long)]
        network: Option<String>,

        /// Skip IMDb lookups; ratings stay empty
        #[arg(long, default_value_t = false)]
        no_enrich: bool,
    },
    /// Books from a Goodreads list, rated from the list itself
    Books {
        /// List id as it appears in the URL, e.g. 1.Best_Books_Ever
        list: String,

        /// Genre written into every row
        #[arg(long)]
        genre: Option<String>,

        /// Stop after this many list pages
        #[arg(long, default_value_t = 10)]
        max_pages: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| ["scraper=info", "mediascrape=info"].join(",").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let kind = match args.command {
        Command::Tv { .. } => Kind::Tv,
        Command::Books { .. } => Kind::Books,
    };
    let config = PipelineConfig {
        kind,
        out: args
            .out
            .unwrap_or_else(|| PathBuf::from("output").join(format!("{}.csv", kind))),
        cache: args.cache,
        max_age_days: args.max_age_days,
        changelog: args.changelog,
        filters: args.filters.try_into()?,
    };
    let fetcher = Fetcher::new(FetchConfig {
        retries: args.retries,
        delay: Duration::from_millis(args.delay_ms),
        ..FetchConfig::default()
    })?;

    let summary = match args.command {
        Command::Tv {
            pages,
            network,
            no_enrich,
        } => {
            let source = WikipediaSource {
                pages,
                default_network: network,
            };
            let enricher = ImdbEnricher::new(&fetcher);
            let enricher = (!no_enrich).then_some(&enricher);
            pipeline::run(&config, &source, &fetcher, enricher).await?
        }
        Command::Books {
            list,
            genre,
            max_pages,
        } => {
            let source = GoodreadsSource {
                list_id: list,
                genre,
                max_pages,
            };
            pipeline::run(&config, &source, &fetcher, None::<&ImdbEnricher>).await?
        }
    };

    let RunSummary {
        scraped,
        kept,
        added,
        updated,
        removed,
        written,
    } = summary;
    info!(
        scraped,
        kept, added, updated, removed, written, "wrote {}", config.out.display()
    );
    Ok(())
}
