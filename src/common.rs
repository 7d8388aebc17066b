use std::fmt::{self, Display};

use serde::{Deserialize, Serialize, Serializer};

pub const NOT_FOUND: &str = "not found";
pub const LOOKUP_ERROR: &str = "lookup error";

/// A quality score as it flows through the pipeline. Failed lookups stay
/// distinguishable from real numbers instead of being folded into them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Score {
    Value(f64),
    NotFound,
    LookupError,
    /// no lookup was attempted
    #[default]
    Missing,
}

impl Score {
    /// Best-effort coercion of a persisted cell. Unknown text degrades to `Missing`.
    pub fn parse(raw: &str) -> Score {
        let raw = raw.trim();
        if raw.is_empty() {
            Score::Missing
        } else if raw.eq_ignore_ascii_case(NOT_FOUND) {
            Score::NotFound
        } else if raw.eq_ignore_ascii_case(LOOKUP_ERROR) {
            Score::LookupError
        } else {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Score::Value(v),
                _ => Score::Missing,
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Value(v) => write!(f, "{}", v),
            Score::NotFound => f.write_str(NOT_FOUND),
            Score::LookupError => f.write_str(LOOKUP_ERROR),
            Score::Missing => Ok(()),
        }
    }
}

impl Serialize for Score {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Score::Value(v) => serializer.serialize_f64(*v),
            Score::Missing => serializer.serialize_none(),
            sentinel => serializer.serialize_str(&sentinel.to_string()),
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub title: String,
    #[serde(rename = "Genre")]
    pub category: Option<String>,
    #[serde(rename = "Network")]
    pub group: Option<String>,
    #[serde(rename = "Premiere")]
    pub temporal: Option<String>,
    pub rating: Score,
    pub votes: Option<u64>,
    #[serde(rename = "Id")]
    pub external_id: Option<String>,
}

impl Record {
    pub fn new(title: impl Into<String>) -> Self {
        Record {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_temporal(mut self, temporal: impl Into<String>) -> Self {
        self.temporal = Some(temporal.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_rating(mut self, rating: Score) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_votes(mut self, votes: u64) -> Self {
        self.votes = Some(votes);
        self
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Copies an enrichment outcome onto this record. Sentinel outcomes
    /// clear votes and keep whatever id was already known.
    pub fn apply_lookup(&mut self, result: &LookupResult) {
        match result {
            LookupResult::Ok { id, rating, votes } => {
                self.rating = rating.map(Score::Value).unwrap_or(Score::Missing);
                self.votes = *votes;
                if id.is_some() {
                    self.external_id = id.clone();
                }
            }
            LookupResult::NotFound => {
                self.rating = Score::NotFound;
                self.votes = None;
            }
            LookupResult::Error => {
                self.rating = Score::LookupError;
                self.votes = None;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Ok,
    NotFound,
    Error,
}

/// Outcome of one external rating lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Ok {
        id: Option<String>,
        rating: Option<f64>,
        votes: Option<u64>,
    },
    NotFound,
    Error,
}

impl LookupResult {
    pub fn status(&self) -> LookupStatus {
        match self {
            LookupResult::Ok { .. } => LookupStatus::Ok,
            LookupResult::NotFound => LookupStatus::NotFound,
            LookupResult::Error => LookupStatus::Error,
        }
    }
}

/// Which output schema a run writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Tv,
    Books,
}

impl Kind {
    pub fn headers(self) -> [&'static str; 7] {
        match self {
            Kind::Tv => [
                "Title", "Genre", "Premiere", "Network", "Rating", "Votes", "ImdbId",
            ],
            Kind::Books => [
                "Title",
                "Genre",
                "PubYear",
                "Author",
                "Rating",
                "Votes",
                "GoodreadsId",
            ],
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Tv => f.write_str("tv"),
            Kind::Books => f.write_str("books"),
        }
    }
}
