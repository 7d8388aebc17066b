use std::{fs, path::Path, sync::Mutex};

use anyhow::Result;
use mediascrape::{
    common::{Kind, LookupResult, Record, Score},
    data::{read_records, LookupCache},
    filter::Filters,
    net::{FetchConfig, Fetcher},
    pipeline::{run, PipelineConfig},
    scraper::{Enricher, Hints, Source},
};

struct FixedSource {
    rows: Vec<Record>,
}

impl Source for FixedSource {
    fn describe(&self) -> String {
        "fixed rows".to_string()
    }

    async fn scrape(&self, _fetcher: &Fetcher) -> Result<Vec<Record>> {
        Ok(self.rows.clone())
    }
}

struct TableEnricher {
    ratings: Vec<(&'static str, f64, u64)>,
    seen: Mutex<Vec<String>>,
}

impl Enricher for TableEnricher {
    async fn enrich_one(&self, title: &str, _year: Option<i16>, _hints: &Hints) -> LookupResult {
        self.seen.lock().unwrap().push(title.to_string());
        match self.ratings.iter().find(|(t, _, _)| *t == title) {
            Some((_, rating, votes)) => LookupResult::Ok {
                id: Some(format!("tt-{}", title.len())),
                rating: Some(*rating),
                votes: Some(*votes),
            },
            None => LookupResult::NotFound,
        }
    }
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        kind: Kind::Tv,
        out: dir.join("output").join("tv.csv"),
        cache: dir.join("cache").join("lookup_cache.json"),
        max_age_days: 21,
        changelog: Some(dir.join("changelog.json")),
        filters: Filters::default(),
    }
}

fn fetcher() -> Fetcher {
    Fetcher::new(FetchConfig::default()).unwrap()
}

fn show(title: &str, premiere: &str) -> Record {
    Record::new(title)
        .with_group("X")
        .with_temporal(premiere)
        .with_category("Drama")
}

#[tokio::test]
async fn second_run_updates_retains_and_reuses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let fetcher = fetcher();

    let first_enricher = TableEnricher {
        ratings: vec![("Show A", 8.0, 500), ("Show B", 6.0, 50)],
        seen: Mutex::new(Vec::new()),
    };
    let first = FixedSource {
        rows: vec![
            show("Show A", "January 1, 2024"),
            show("Show B", "2023-05-05"),
            show("Show Gone", "TBA"),
        ],
    };
    let summary = run(&config, &first, &fetcher, Some(&first_enricher)).await.unwrap();
    assert_eq!(summary.added, 3);
    assert_eq!(summary.written, 3);

    let written = read_records(&config.out).unwrap();
    let titles: Vec<_> = written.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Show A", "Show B", "Show Gone"]);
    assert_eq!(written[2].rating, Score::NotFound);
    assert_eq!(LookupCache::load(&config.cache).len(), 3);

    // second run: Show A was re-scraped, Show B vanished, Show D is new
    let second_enricher = TableEnricher {
        ratings: vec![("Show D", 9.1, 10)],
        seen: Mutex::new(Vec::new()),
    };
    let second = FixedSource {
        rows: vec![
            show("show a", "2024-01-01"),
            show("Show D", "2024-06-01"),
            show("Show D", "2024-06-01").with_category("Duplicate"),
        ],
    };
    let summary = run(&config, &second, &fetcher, Some(&second_enricher)).await.unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 2);
    assert_eq!(summary.written, 4);

    // Show A came from the cache, so only Show D was looked up
    assert_eq!(*second_enricher.seen.lock().unwrap(), ["Show D"]);

    let written = read_records(&config.out).unwrap();
    let titles: Vec<_> = written.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Show D", "show a", "Show B", "Show Gone"]);
    assert_eq!(written[0].category.as_deref(), Some("Drama"));
    assert_eq!(written[1].rating, Score::Value(8.0));

    let changelog: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.changelog.as_ref().unwrap()).unwrap())
            .unwrap();
    assert_eq!(changelog["Added"][0]["Title"], "Show D");
    assert_eq!(changelog["Removed"].as_array().unwrap().len(), 2);
    assert_eq!(changelog["Updated"][0]["Diff"]["title"]["New"], "show a");
}

#[tokio::test]
async fn filters_apply_before_merge() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.filters = Filters {
        min_rating: Some(7.0),
        ..Filters::default()
    };
    let enricher = TableEnricher {
        ratings: vec![("Good", 7.5, 100), ("Bad", 3.0, 100)],
        seen: Mutex::new(Vec::new()),
    };
    let source = FixedSource {
        rows: vec![show("Good", "2020-01-01"), show("Bad", "2020-01-01"), show("Unknown", "2020-01-01")],
    };
    let summary = run(&config, &source, &fetcher(), Some(&enricher)).await.unwrap();
    assert_eq!(summary.scraped, 3);
    assert_eq!(summary.kept, 2);

    let titles: Vec<_> = read_records(&config.out)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, ["Good", "Unknown"]);
}

#[tokio::test]
async fn without_enricher_ratings_stay_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.changelog = None;
    let source = FixedSource {
        rows: vec![show("Plain", "2020-01-01")],
    };
    run(&config, &source, &fetcher(), None::<&TableEnricher>)
        .await
        .unwrap();

    let written = read_records(&config.out).unwrap();
    assert_eq!(written[0].rating, Score::Missing);
    assert!(!config.cache.exists());
    assert!(!dir.path().join("changelog.json").exists());
}
