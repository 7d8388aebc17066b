use std::{fs, io, path::Path};

use anyhow::{Context, Result};
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::common::{Kind, Record, Score};

// header aliases for both schemas, matched case-insensitively
const TITLE: &[&str] = &["title"];
const GENRE: &[&str] = &["genre", "category"];
const TEMPORAL: &[&str] = &["premiere", "pubyear", "published", "year"];
const GROUP: &[&str] = &["network", "author"];
const RATING: &[&str] = &["rating", "qualityscore"];
const VOTES: &[&str] = &["votes", "volumescore"];
const ID: &[&str] = &["imdbid", "goodreadsid", "externalid", "id"];

struct Columns {
    title: Option<usize>,
    genre: Option<usize>,
    temporal: Option<usize>,
    group: Option<usize>,
    rating: Option<usize>,
    votes: Option<usize>,
    id: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |aliases: &[&str]| {
            headers.iter().position(|h| {
                let h = h.trim().to_ascii_lowercase();
                aliases.iter().any(|a| *a == h)
            })
        };
        Columns {
            title: find(TITLE),
            genre: find(GENRE),
            temporal: find(TEMPORAL),
            group: find(GROUP),
            rating: find(RATING),
            votes: find(VOTES),
            id: find(ID),
        }
    }

    fn record(&self, row: &StringRecord) -> Record {
        let cell = |col: Option<usize>| col.and_then(|i| row.get(i)).map(str::trim).unwrap_or("");
        let text = |col: Option<usize>| Some(cell(col)).filter(|s| !s.is_empty()).map(String::from);
        Record {
            title: cell(self.title).to_string(),
            category: text(self.genre),
            group: text(self.group),
            temporal: text(self.temporal),
            rating: Score::parse(cell(self.rating)),
            votes: parse_votes(cell(self.votes)),
            external_id: text(self.id),
        }
    }
}

pub fn parse_votes(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().or_else(|| {
        digits
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Loads the previously written output. A missing file is an empty store;
/// damaged rows are coerced best-effort and untitled rows are dropped.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(e) if matches!(e.kind(), csv::ErrorKind::Io(err) if err.kind() == io::ErrorKind::NotFound) => {
            debug!(path = %path.display(), "no previous output, starting fresh");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read headers of {}", path.display()))?
        .clone();
    let columns = Columns::from_headers(&headers);
    if columns.title.is_none() {
        warn!(path = %path.display(), "previous output has no Title column");
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        match row {
            Ok(row) => {
                let record = columns.record(&row);
                if record.has_title() {
                    records.push(record);
                }
            }
            Err(error) => warn!(line = line + 2, %error, "skipping unreadable row"),
        }
    }
    info!(path = %path.display(), rows = records.len(), "loaded previous output");
    Ok(records)
}

/// Rewrites the whole output file in the given row order.
pub fn write_records(path: &Path, kind: Kind, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(kind.headers())?;
    for record in records {
        let rating = record.rating.to_string();
        let votes = record.votes.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            record.title.as_str(),
            record.category.as_deref().unwrap_or(""),
            record.temporal.as_deref().unwrap_or(""),
            record.group.as_deref().unwrap_or(""),
            rating.as_str(),
            votes.as_str(),
            record.external_id.as_deref().unwrap_or(""),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    info!(path = %path.display(), rows = records.len(), "wrote output");
    Ok(())
}
