use std::future::Future;

use anyhow::Result;

use crate::{
    common::{LookupResult, Record},
    net::Fetcher,
};

pub mod goodreads;
pub mod imdb;
pub mod wikipedia;

pub use goodreads::GoodreadsSource;
pub use imdb::ImdbEnricher;
pub use wikipedia::WikipediaSource;

/// Something that produces raw rows for one run.
pub trait Source {
    fn describe(&self) -> String;
    fn scrape(&self, fetcher: &Fetcher) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Extra context an enricher may use to pick the right match.
#[derive(Debug, Clone, Default)]
pub struct Hints {
    pub group: Option<String>,
}

/// External rating lookup for one title. Failures come back as
/// `LookupResult::Error` rather than as an `Err`.
pub trait Enricher {
    fn enrich_one(
        &self,
        title: &str,
        year: Option<i16>,
        hints: &Hints,
    ) -> impl Future<Output = LookupResult> + Send;
}
