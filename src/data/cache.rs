use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    common::{LookupResult, LookupStatus},
    identity::normalize,
};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Cache key for enrichment lookups: `group|title`, trimmed and lower-cased.
/// Unlike the identity key it ignores the date.
pub fn cache_key(title: &str, group: Option<&str>) -> String {
    format!("{}|{}", normalize(group), normalize(Some(title)))
}

/// Canonical form of a key read from disk or handed to the cache, so
/// lookups agree with `cache_key` whatever the caller's spacing or case.
fn canonical(key: &str) -> String {
    key.split('|').map(|part| normalize(Some(part))).join("|")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheEntry {
    pub key: String,
    pub status: LookupStatus,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub votes: Option<u64>,
    /// RFC 3339, UTC. Kept as text so a damaged stamp reads as stale.
    pub cached_at: String,
}

impl CacheEntry {
    fn new(key: String, result: &LookupResult, at: Timestamp) -> Self {
        let (id, rating, votes) = match result {
            LookupResult::Ok { id, rating, votes } => (id.clone(), *rating, *votes),
            _ => (None, None, None),
        };
        CacheEntry {
            key,
            status: result.status(),
            id,
            rating,
            votes,
            cached_at: at.to_string(),
        }
    }

    pub fn result(&self) -> LookupResult {
        match self.status {
            LookupStatus::Ok => LookupResult::Ok {
                id: self.id.clone(),
                rating: self.rating,
                votes: self.votes,
            },
            LookupStatus::NotFound => LookupResult::NotFound,
            LookupStatus::Error => LookupResult::Error,
        }
    }
}

/// True iff the stamp parses and is younger than `max_age_days`.
pub fn is_fresh(entry: &CacheEntry, max_age_days: u32, now: Timestamp) -> bool {
    match entry.cached_at.parse::<Timestamp>() {
        Ok(at) => now.as_second() - at.as_second() < i64::from(max_age_days) * SECONDS_PER_DAY,
        Err(_) => false,
    }
}

/// Disk-backed store of enrichment results. Owned by a single pipeline run;
/// stale entries are bypassed but stay on disk until overwritten.
#[derive(Debug, Default)]
pub struct LookupCache {
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the JSON array at `path`. A missing or unreadable file yields an
    /// empty cache.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no lookup cache yet");
                return Self::new();
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to read lookup cache, starting empty");
                return Self::new();
            }
        };
        match serde_json::from_str::<Vec<CacheEntry>>(&text) {
            Ok(entries) => {
                let entries: BTreeMap<_, _> = entries
                    .into_iter()
                    .map(|mut e| {
                        e.key = canonical(&e.key);
                        (e.key.clone(), e)
                    })
                    .collect();
                info!(path = %path.display(), entries = entries.len(), "loaded lookup cache");
                LookupCache {
                    entries,
                    dirty: false,
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "malformed lookup cache, starting empty");
                Self::new()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(&canonical(key))
    }

    /// The cached result for `key`, if present and fresh.
    pub fn fresh(&self, key: &str, max_age_days: u32, now: Timestamp) -> Option<LookupResult> {
        self.get(key)
            .filter(|e| is_fresh(e, max_age_days, now))
            .map(CacheEntry::result)
    }

    pub fn put(&mut self, key: impl Into<String>, result: &LookupResult) {
        self.put_at(key, result, Timestamp::now());
    }

    pub fn put_at(&mut self, key: impl Into<String>, result: &LookupResult, at: Timestamp) {
        let key = canonical(&key.into());
        self.entries
            .insert(key.clone(), CacheEntry::new(key, result, at));
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the whole cache if anything changed since load. Failures are
    /// logged and leave the cache dirty. Returns whether a write happened.
    pub fn save(&mut self, path: &Path) -> bool {
        if !self.dirty {
            debug!("lookup cache unchanged, skipping save");
            return false;
        }
        match self.write(path) {
            Ok(()) => {
                self.dirty = false;
                info!(path = %path.display(), entries = self.entries.len(), "saved lookup cache");
                true
            }
            Err(error) => {
                warn!(path = %path.display(), "failed to save lookup cache: {error:#}");
                false
            }
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let entries: Vec<&CacheEntry> = self.entries.values().collect();
        let json = serde_json::to_string_pretty(&entries)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))
    }
}
