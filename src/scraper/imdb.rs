use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{common::LookupResult, data::store::parse_votes, net::Fetcher};

use super::{Enricher, Hints};

const SUGGEST_BASE: &str = "https://v3.sg.media-imdb.com/suggestion/x/";
const TITLE_BASE: &str = "https://www.imdb.com/title/";
const TV_KINDS: &[&str] = &["tvSeries", "tvMiniSeries", "tvSpecial", "tvMovie"];

static AGGREGATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"aggregateRating"\s*:\s*\{([^}]*)\}"#).unwrap());
static RATING_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""ratingValue"\s*:\s*"?([\d.]+)"#).unwrap());
static RATING_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""ratingCount"\s*:\s*"?([\d,]+)"#).unwrap());

#[derive(Debug, Deserialize)]
struct Suggestions {
    #[serde(default)]
    d: Vec<Suggestion>,
}

#[derive(Debug, Clone, Deserialize)]
struct Suggestion {
    id: String,
    #[serde(default)]
    qid: Option<String>,
    #[serde(default)]
    y: Option<i32>,
}

impl Suggestion {
    fn is_tv(&self) -> bool {
        self.id.starts_with("tt")
            && self
                .qid
                .as_deref()
                .is_some_and(|kind| TV_KINDS.contains(&kind))
    }
}

/// First TV hit within a year of the hint, else the first TV hit at all.
fn choose(suggestions: &[Suggestion], year: Option<i16>) -> Option<&Suggestion> {
    let mut tv = suggestions.iter().filter(|s| s.is_tv());
    let close = year.and_then(|year| {
        tv.clone()
            .find(|s| s.y.is_some_and(|y| (y - i32::from(year)).abs() <= 1))
    });
    close.or_else(|| tv.next())
}

/// Rating and vote count from a title page's JSON-LD block.
pub fn parse_rating(html: &str) -> (Option<f64>, Option<u64>) {
    let Some(block) = AGGREGATE.captures(html) else {
        return (None, None);
    };
    let block = &block[1];
    let rating = RATING_VALUE
        .captures(block)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|r| r.is_finite());
    let votes = RATING_COUNT
        .captures(block)
        .and_then(|c| parse_votes(&c[1]));
    (rating, votes)
}

fn suggest_url(title: &str) -> Result<Url> {
    let mut url = Url::parse(SUGGEST_BASE)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("suggestion url cannot be a base"))?
        .pop_if_empty()
        .push(&format!("{}.json", title.trim().to_lowercase()));
    Ok(url)
}

fn title_url(id: &str) -> Result<Url> {
    Ok(Url::parse(TITLE_BASE)?.join(&format!("{}/", id))?)
}

/// Rating lookup against IMDb's public suggestion endpoint and title pages.
pub struct ImdbEnricher<'a> {
    fetcher: &'a Fetcher,
}

impl<'a> ImdbEnricher<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        ImdbEnricher { fetcher }
    }

    async fn lookup(&self, title: &str, year: Option<i16>) -> Result<LookupResult> {
        let Some(suggestions) = self
            .fetcher
            .get_json::<Suggestions>(&suggest_url(title)?)
            .await?
        else {
            return Ok(LookupResult::NotFound);
        };
        let Some(hit) = choose(&suggestions.d, year) else {
            return Ok(LookupResult::NotFound);
        };
        debug!(title, id = %hit.id, year = ?hit.y, "imdb match");

        let (rating, votes) = match self.fetcher.get_text(&title_url(&hit.id)?).await? {
            Some(html) => parse_rating(&html),
            None => (None, None),
        };
        Ok(LookupResult::Ok {
            id: Some(hit.id.clone()),
            rating,
            votes,
        })
    }
}

impl Enricher for ImdbEnricher<'_> {
    async fn enrich_one(&self, title: &str, year: Option<i16>, hints: &Hints) -> LookupResult {
        match self.lookup(title, year).await {
            Ok(result) => result,
            Err(error) => {
                warn!(title, network = ?hints.group, "imdb lookup failed: {error:#}");
                LookupResult::Error
            }
        }
    }
}
