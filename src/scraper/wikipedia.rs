use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    common::Record,
    html::{table_rows, tables_with_class},
    net::Fetcher,
};

use super::Source;

const WIKI_BASE: &str = "https://en.wikipedia.org/wiki/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Title,
    Genre,
    Premiere,
    Network,
}

/// Header text to column role. Premiere is tried before title so that
/// "Series premiere" is not taken for the title column.
fn classify(header: &str) -> Option<Column> {
    let h = header.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| h.contains(w));
    if has(&["premiere", "release", "first aired", "air date"]) {
        Some(Column::Premiere)
    } else if has(&["genre"]) {
        Some(Column::Genre)
    } else if has(&["network", "channel", "platform"]) {
        Some(Column::Network)
    } else if has(&["title", "program", "series", "show"]) {
        Some(Column::Title)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct Layout {
    title: Option<usize>,
    genre: Option<usize>,
    premiere: Option<usize>,
    network: Option<usize>,
}

impl Layout {
    fn from_headers(headers: &[String]) -> Self {
        let mut layout = Layout::default();
        for (i, header) in headers.iter().enumerate() {
            let slot = match classify(header) {
                Some(Column::Title) => &mut layout.title,
                Some(Column::Genre) => &mut layout.genre,
                Some(Column::Premiere) => &mut layout.premiere,
                Some(Column::Network) => &mut layout.network,
                None => continue,
            };
            slot.get_or_insert(i);
        }
        layout
    }
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '"' | '“' | '”' | '\''))
        .trim()
        .to_string()
}

/// Extracts shows from every wikitable on a page. Tables without a
/// recognizable title column are skipped.
pub fn parse_page(html: &str, default_network: Option<&str>) -> Vec<Record> {
    let mut records = Vec::new();
    for (index, table) in tables_with_class(html, "wikitable").into_iter().enumerate() {
        let rows = table_rows(table);
        let Some(header_at) = rows.iter().position(|r| r.header) else {
            debug!(index, "wikitable without header row");
            continue;
        };
        let layout = Layout::from_headers(&rows[header_at].cells);
        let Some(title_col) = layout.title else {
            debug!(index, headers = ?rows[header_at].cells, "wikitable without title column");
            continue;
        };

        for row in rows.iter().skip(header_at + 1).filter(|r| !r.header) {
            let cell = |col: Option<usize>| {
                col.and_then(|i| row.cells.get(i))
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            let title = row.cells.get(title_col).map(|s| clean_title(s)).unwrap_or_default();
            if title.is_empty() {
                continue;
            }
            records.push(Record {
                title,
                category: cell(layout.genre),
                temporal: cell(layout.premiere),
                group: cell(layout.network).or_else(|| default_network.map(String::from)),
                ..Default::default()
            });
        }
    }
    records
}

pub fn page_url(page: &str) -> Result<Url> {
    let mut url = Url::parse(WIKI_BASE)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("wiki base url cannot be a base"))?
        .pop_if_empty()
        .push(&page.trim().replace(' ', "_"));
    Ok(url)
}

/// Wikipedia "list of ... programming" style pages.
#[derive(Debug, Clone)]
pub struct WikipediaSource {
    pub pages: Vec<String>,
    pub default_network: Option<String>,
}

impl Source for WikipediaSource {
    fn describe(&self) -> String {
        format!("wikipedia {}", self.pages.join(", "))
    }

    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for page in &self.pages {
            let url = page_url(page)?;
            let Some(html) = fetcher
                .get_text(&url)
                .await
                .with_context(|| format!("failed to fetch wikipedia page {}", page))?
            else {
                warn!(page = %page, "wikipedia page not found");
                continue;
            };
            let rows = parse_page(&html, self.default_network.as_deref());
            info!(page = %page, rows = rows.len(), "scraped wikipedia page");
            records.extend(rows);
        }
        Ok(records)
    }
}
