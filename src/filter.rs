use jiff::civil::Date;
use tracing::debug;

use crate::{common::Record, identity::parse_date};

/// Numeric and categorical thresholds applied to freshly scraped rows.
/// Unknown values (sentinel ratings, missing votes, unparseable dates) pass.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub min_rating: Option<f64>,
    pub min_votes: Option<u64>,
    pub since: Option<Date>,
    pub until: Option<Date>,
    pub genres: Vec<String>,
    pub networks: Vec<String>,
}

fn matches_any(value: Option<&str>, wanted: &[String]) -> bool {
    if wanted.is_empty() {
        return true;
    }
    let Some(value) = value.map(str::to_lowercase) else {
        return false;
    };
    wanted
        .iter()
        .any(|w| value.contains(w.trim().to_lowercase().as_str()))
}

impl Filters {
    pub fn accepts(&self, record: &Record) -> bool {
        if !record.has_title() {
            return false;
        }
        if let (Some(min), Some(rating)) = (self.min_rating, record.rating.as_number()) {
            if rating < min {
                return false;
            }
        }
        if let (Some(min), Some(votes)) = (self.min_votes, record.votes) {
            if votes < min {
                return false;
            }
        }
        if self.since.is_some() || self.until.is_some() {
            if let Some(date) = record.temporal.as_deref().and_then(parse_date) {
                if self.since.is_some_and(|since| date < since)
                    || self.until.is_some_and(|until| date > until)
                {
                    return false;
                }
            }
        }
        matches_any(record.category.as_deref(), &self.genres)
            && matches_any(record.group.as_deref(), &self.networks)
    }

    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let before = records.len();
        let kept: Vec<Record> = records.into_iter().filter(|r| self.accepts(r)).collect();
        debug!(before, after = kept.len(), "applied filters");
        kept
    }
}
