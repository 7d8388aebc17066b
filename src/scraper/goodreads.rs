use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::{
    common::{Record, Score},
    data::store::parse_votes,
    html::{attr, strip_tags},
    net::Fetcher,
};

use super::Source;

static BOOK_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<tr\b[^>]*itemtype="http://schema\.org/Book"[^>]*>(.*?)</tr>"#).unwrap()
});
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").unwrap());
static BOOK_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/book/show/(\d+)").unwrap());
static MINI_RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d.]+)\s+avg rating\s*[—–-]+\s*([\d,]+)\s+ratings?").unwrap()
});
static PUBLISHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)published\s+(\d{4})").unwrap());
static NEXT_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\b[^>]*class="next_page""#).unwrap());

#[derive(Debug, Default, PartialEq)]
pub struct ListPage {
    pub books: Vec<Record>,
    pub has_next: bool,
}

fn has_class(attrs: &str, class: &str) -> bool {
    attr(attrs, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

fn parse_row(row: &str, genre: Option<&str>) -> Option<Record> {
    let mut title = None;
    let mut id = None;
    let mut author = None;
    for a in ANCHOR.captures_iter(row) {
        if title.is_none() && has_class(&a[1], "bookTitle") {
            title = Some(strip_tags(&a[2]));
            id = attr(&a[1], "href")
                .and_then(|href| BOOK_ID.captures(href))
                .map(|c| c[1].to_string());
        } else if author.is_none() && has_class(&a[1], "authorName") {
            author = Some(strip_tags(&a[2]));
        }
    }
    let title = title.filter(|t| !t.is_empty())?;

    let text = strip_tags(row);
    let (rating, votes) = match MINI_RATING.captures(&text) {
        Some(c) => (Score::parse(&c[1]), parse_votes(&c[2])),
        None => (Score::Missing, None),
    };

    Some(Record {
        title,
        category: genre.map(String::from),
        group: author.filter(|a| !a.is_empty()),
        temporal: PUBLISHED.captures(&text).map(|c| c[1].to_string()),
        rating,
        votes,
        external_id: id,
    })
}

/// One page of a Goodreads list. Rows without a title are skipped.
pub fn parse_list_page(html: &str, genre: Option<&str>) -> ListPage {
    ListPage {
        books: BOOK_ROW
            .captures_iter(html)
            .filter_map(|c| parse_row(&c[1], genre))
            .collect(),
        has_next: NEXT_PAGE.is_match(html),
    }
}

pub fn list_url(list_id: &str, page: u32) -> Result<Url> {
    let mut url = Url::parse("https://www.goodreads.com/list/show/")?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("goodreads base url cannot be a base"))?
        .pop_if_empty()
        .push(list_id.trim());
    url.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(url)
}

/// A Goodreads list, followed page by page until there is no next link.
#[derive(Debug, Clone)]
pub struct GoodreadsSource {
    pub list_id: String,
    pub genre: Option<String>,
    pub max_pages: u32,
}

impl Source for GoodreadsSource {
    fn describe(&self) -> String {
        format!("goodreads list {}", self.list_id)
    }

    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<Record>> {
        let mut books = Vec::new();
        for page in 1..=self.max_pages.max(1) {
            let url = list_url(&self.list_id, page)?;
            let Some(html) = fetcher
                .get_text(&url)
                .await
                .with_context(|| format!("failed to fetch goodreads list page {}", page))?
            else {
                warn!(list = %self.list_id, page, "goodreads list page not found");
                break;
            };
            let parsed = parse_list_page(&html, self.genre.as_deref());
            info!(list = %self.list_id, page, rows = parsed.books.len(), "scraped goodreads page");
            books.extend(parsed.books);
            if !parsed.has_next {
                break;
            }
        }
        Ok(books)
    }
}
