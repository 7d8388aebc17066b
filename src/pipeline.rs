use std::path::PathBuf;

use anyhow::{Context, Result};
use jiff::Timestamp;
use tracing::{debug, info, instrument, warn};

use crate::{
    common::{Kind, Record, Score},
    data::{cache_key, read_records, write_records, LookupCache},
    delta::{diff, write_changelog, Delta},
    filter::Filters,
    identity::parse_date,
    merge::{dedup, merge},
    net::Fetcher,
    scraper::{Enricher, Hints, Source},
    sort::sorted,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub kind: Kind,
    pub out: PathBuf,
    pub cache: PathBuf,
    pub max_age_days: u32,
    pub changelog: Option<PathBuf>,
    pub filters: Filters,
}

/// Result of folding one run into the previous output.
#[derive(Debug)]
pub struct Reconciled {
    /// every retained record, in output order
    pub records: Vec<Record>,
    pub delta: Delta,
}

/// Dedups `new`, merges it over `old`, diffs the two generations and sorts
/// the merged set. Pure; the same inputs always give the same output.
pub fn reconcile(old: Vec<Record>, new: Vec<Record>) -> Reconciled {
    let new = dedup(new);
    let old: Vec<Record> = old.into_iter().filter(Record::has_title).collect();
    let delta = diff(&old, &new);
    let merged = merge(old, new);
    Reconciled {
        records: sorted(merged.into_values().collect()),
        delta,
    }
}

/// Fills in ratings through the cache, calling `enricher` only for missing
/// or stale entries. Rows that already carry a numeric rating are untouched.
pub async fn enrich_records<E: Enricher>(
    mut records: Vec<Record>,
    enricher: &E,
    cache: &mut LookupCache,
    max_age_days: u32,
) -> Vec<Record> {
    let now = Timestamp::now();
    let (mut hits, mut lookups) = (0usize, 0usize);
    for record in records.iter_mut().filter(|r| !matches!(r.rating, Score::Value(_))) {
        let key = cache_key(&record.title, record.group.as_deref());
        let result = match cache.fresh(&key, max_age_days, now) {
            Some(result) => {
                hits += 1;
                result
            }
            None => {
                lookups += 1;
                let year = record
                    .temporal
                    .as_deref()
                    .and_then(parse_date)
                    .map(|d| d.year());
                let hints = Hints {
                    group: record.group.clone(),
                };
                let result = enricher.enrich_one(&record.title, year, &hints).await;
                cache.put(key, &result);
                result
            }
        };
        record.apply_lookup(&result);
    }
    info!(cache_hits = hits, lookups, "enrichment done");
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub scraped: usize,
    pub kept: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub written: usize,
}

/// One full batch: scrape, enrich, filter, reconcile against the previous
/// output and rewrite it. Nothing is written until every step before the
/// final write has finished.
#[instrument(level = "info", skip_all, fields(source = %source.describe(), out = %config.out.display()))]
pub async fn run<S: Source, E: Enricher>(
    config: &PipelineConfig,
    source: &S,
    fetcher: &Fetcher,
    enricher: Option<&E>,
) -> Result<RunSummary> {
    let mut cache = LookupCache::load(&config.cache);

    let scraped = source.scrape(fetcher).await?;
    let scraped_count = scraped.len();
    info!(rows = scraped_count, "scraped");

    let enriched = match enricher {
        Some(enricher) => {
            enrich_records(scraped, enricher, &mut cache, config.max_age_days).await
        }
        None => {
            debug!("enrichment disabled");
            scraped
        }
    };
    let kept = config.filters.apply(enriched);

    let old = read_records(&config.out)
        .with_context(|| format!("failed to load previous output {}", config.out.display()))?;
    let Reconciled { records, delta } = reconcile(old, kept.clone());
    info!(
        added = delta.added.len(),
        updated = delta.updated.len(),
        removed = delta.removed.len(),
        total = records.len(),
        "reconciled with previous output"
    );

    cache.save(&config.cache);

    if let Some(path) = &config.changelog {
        if let Err(error) = write_changelog(&delta, path) {
            warn!(path = %path.display(), "failed to write changelog: {error:#}");
        }
    }

    write_records(&config.out, config.kind, &records)?;

    Ok(RunSummary {
        scraped: scraped_count,
        kept: kept.len(),
        added: delta.added.len(),
        updated: delta.updated.len(),
        removed: delta.removed.len(),
        written: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{common::LookupResult, identity::IdentityKey, net::FetchConfig};

    fn show(title: &str, rating: f64, votes: u64) -> Record {
        Record::new(title)
            .with_group("X")
            .with_temporal("2024-01-01")
            .with_rating(Score::Value(rating))
            .with_votes(votes)
    }

    #[test]
    fn updated_record_replaces_old() {
        let out = reconcile(vec![show("Show A", 8.0, 500)], vec![show("Show A", 8.5, 600)]);
        assert_eq!(out.records, vec![show("Show A", 8.5, 600)]);
        assert_eq!(out.delta.updated.len(), 1);
        assert_eq!(out.delta.updated[0].diff.len(), 2);
    }

    #[test]
    fn missing_record_is_retained_and_reported() {
        let old = vec![show("Show B", 6.0, 10), show("Show A", 8.0, 500)];
        let out = reconcile(old, vec![show("Show A", 8.0, 500)]);
        assert_eq!(out.records.len(), 2);
        assert!(out.records.contains(&show("Show B", 6.0, 10)));
        assert_eq!(out.delta.removed.len(), 1);
        assert_eq!(
            out.delta.removed[0].key,
            IdentityKey::of(&show("Show B", 6.0, 10)).unwrap()
        );
        assert!(out.delta.updated.is_empty());
    }

    #[test]
    fn duplicate_rows_in_one_run_keep_first() {
        let out = reconcile(vec![], vec![show("Show C", 7.0, 1), show("Show C", 9.0, 1)]);
        assert_eq!(out.records, vec![show("Show C", 7.0, 1)]);
        assert_eq!(out.delta.added.len(), 1);
    }

    #[test]
    fn reconcile_is_deterministic() {
        let old = vec![show("b", 7.0, 1), show("a", 7.0, 1), Record::new("z")];
        let new = vec![show("c", 7.0, 1), show("a", 9.0, 3)];
        let first = reconcile(old.clone(), new.clone()).records;
        let again = reconcile(first.clone(), new).records;
        assert_eq!(first, again);
        assert_eq!(
            first.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c", "z"]
        );
    }

    struct Stub {
        calls: AtomicUsize,
    }

    impl Enricher for Stub {
        async fn enrich_one(&self, title: &str, _year: Option<i16>, _hints: &Hints) -> LookupResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if title.contains("missing") {
                LookupResult::NotFound
            } else {
                LookupResult::Ok {
                    id: Some("tt42".to_string()),
                    rating: Some(7.9),
                    votes: Some(1000),
                }
            }
        }
    }

    #[tokio::test]
    async fn enrichment_uses_fresh_cache_entries() {
        let stub = Stub {
            calls: AtomicUsize::new(0),
        };
        let mut cache = LookupCache::new();
        cache.put(
            cache_key("Cached", Some("X")),
            &LookupResult::Ok {
                id: None,
                rating: Some(5.0),
                votes: Some(1),
            },
        );

        let records = vec![
            Record::new("Cached").with_group("X"),
            Record::new("Fresh").with_group("X"),
            Record::new("The missing one").with_group("X"),
            Record::new("Already rated").with_rating(Score::Value(4.0)),
        ];
        let out = enrich_records(records, &stub, &mut cache, 21).await;

        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
        assert_eq!(out[0].rating, Score::Value(5.0));
        assert_eq!(out[1].rating, Score::Value(7.9));
        assert_eq!(out[1].external_id.as_deref(), Some("tt42"));
        assert_eq!(out[2].rating, Score::NotFound);
        assert_eq!(out[3].rating, Score::Value(4.0));
        assert!(cache.get(&cache_key("Fresh", Some("X"))).is_some());
        assert!(cache.get(&cache_key("Already rated", None)).is_none());
    }

    #[tokio::test]
    async fn stale_cache_entries_are_refreshed() {
        let stub = Stub {
            calls: AtomicUsize::new(0),
        };
        let mut cache = LookupCache::new();
        let key = cache_key("Show C", Some("X"));
        let month_ago = Timestamp::from_second(Timestamp::now().as_second() - 30 * 86_400).unwrap();
        cache.put_at(&key, &LookupResult::NotFound, month_ago);
        let before = cache.get(&key).unwrap().cached_at.clone();

        let out = enrich_records(vec![Record::new("Show C").with_group("X")], &stub, &mut cache, 21).await;

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out[0].rating, Score::Value(7.9));
        assert_ne!(cache.get(&key).unwrap().cached_at, before);
    }

    struct Rows(Vec<Record>);

    impl Source for Rows {
        fn describe(&self) -> String {
            "rows".to_string()
        }

        async fn scrape(&self, _fetcher: &Fetcher) -> Result<Vec<Record>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn changelog_failure_does_not_block_output() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "plain file").unwrap();
        let config = PipelineConfig {
            kind: Kind::Tv,
            out: dir.path().join("tv.csv"),
            cache: dir.path().join("cache.json"),
            max_age_days: 21,
            changelog: Some(blocker.join("changelog.json")),
            filters: Filters::default(),
        };
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let source = Rows(vec![show("Show A", 8.0, 500)]);

        let summary = run(&config, &source, &fetcher, None::<&Stub>).await.unwrap();

        assert_eq!(summary.written, 1);
        assert!(!blocker.join("changelog.json").exists());
        assert_eq!(read_records(&config.out).unwrap()[0].title, "Show A");
    }
}
