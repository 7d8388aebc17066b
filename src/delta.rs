use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::{common::Record, identity::IdentityKey, merge::keyed};

/// Old-vs-new comparison of one run, for the changelog and the run summary.
/// Never feeds back into the merged output.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Delta {
    pub added: Vec<KeyedRecord>,
    pub updated: Vec<Update>,
    /// absent from this run, still retained by the merge
    pub removed: Vec<KeyedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedRecord {
    #[serde(rename = "Key")]
    pub key: IdentityKey,
    #[serde(flatten)]
    pub record: Record,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Update {
    pub key: IdentityKey,
    pub old: Record,
    pub new: Record,
    pub diff: BTreeMap<&'static str, FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

fn tracked_fields(record: &Record) -> [(&'static str, Value); 7] {
    let text = |s: &Option<String>| s.as_ref().map_or(Value::Null, |s| Value::from(s.as_str()));
    [
        ("title", Value::from(record.title.as_str())),
        ("genre", text(&record.category)),
        ("premiere", text(&record.temporal)),
        ("network", text(&record.group)),
        (
            "rating",
            serde_json::to_value(record.rating).unwrap_or(Value::Null),
        ),
        ("votes", record.votes.map_or(Value::Null, Value::from)),
        ("id", text(&record.external_id)),
    ]
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fields compared as numbers when both sides hold one. Text fields always
/// compare as-is, even when they happen to look numeric.
const NUMERIC_FIELDS: [&str; 2] = ["rating", "votes"];

fn differs(field: &str, old: &Value, new: &Value) -> bool {
    if !NUMERIC_FIELDS.contains(&field) {
        return old != new;
    }
    match (as_number(old), as_number(new)) {
        (Some(a), Some(b)) => a != b,
        _ => old != new,
    }
}

pub fn field_diff(old: &Record, new: &Record) -> BTreeMap<&'static str, FieldChange> {
    tracked_fields(old)
        .into_iter()
        .zip(tracked_fields(new))
        .filter(|((name, o), (_, n))| differs(name, o, n))
        .map(|((name, old), (_, new))| (name, FieldChange { old, new }))
        .collect()
}

pub fn diff(old: &[Record], new: &[Record]) -> Delta {
    let old = keyed(old.iter().cloned());
    let new = keyed(new.iter().cloned());
    let mut delta = Delta::default();

    for (key, record) in &new {
        match old.get(key) {
            None => delta.added.push(KeyedRecord {
                key: key.clone(),
                record: record.clone(),
            }),
            Some(previous) => {
                let changes = field_diff(previous, record);
                if !changes.is_empty() {
                    delta.updated.push(Update {
                        key: key.clone(),
                        old: previous.clone(),
                        new: record.clone(),
                        diff: changes,
                    });
                }
            }
        }
    }
    for (key, record) in old {
        if !new.contains_key(&key) {
            delta.removed.push(KeyedRecord { key, record });
        }
    }
    delta
}

pub fn write_changelog(delta: &Delta, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(delta)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::common::Score;

    fn show(title: &str, rating: Score, votes: u64) -> Record {
        Record::new(title)
            .with_group("X")
            .with_temporal("2024-01-01")
            .with_rating(rating)
            .with_votes(votes)
    }

    #[test]
    fn updated_reports_numeric_field_changes() {
        let old = vec![show("Show A", Score::Value(8.0), 500)];
        let new = vec![show("Show A", Score::Value(8.5), 600)];
        let delta = diff(&old, &new);

        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        assert_eq!(delta.updated.len(), 1);
        let update = &delta.updated[0];
        assert_eq!(update.key.as_str(), "show a|x|2024-01-01");
        assert_eq!(update.diff.len(), 2);
        assert_eq!(
            update.diff["rating"],
            FieldChange {
                old: json!(8.0),
                new: json!(8.5)
            }
        );
        assert_eq!(
            update.diff["votes"],
            FieldChange {
                old: json!(500),
                new: json!(600)
            }
        );
    }

    #[test]
    fn removed_and_added_are_classified() {
        let old = vec![show("Show B", Score::Value(6.0), 10)];
        let new = vec![show("Show A", Score::Value(7.0), 10)];
        let delta = diff(&old, &new);
        assert_eq!(delta.added.len(), 1);
        assert_eq!(delta.added[0].record.title, "Show A");
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.removed[0].key.as_str(), "show b|x|2024-01-01");
    }

    #[test]
    fn sentinel_against_number_is_a_change() {
        let old = vec![show("A", Score::NotFound, 0)];
        let new = vec![show("A", Score::Value(7.0), 0)];
        let delta = diff(&old, &new);
        assert_eq!(
            delta.updated[0].diff["rating"],
            FieldChange {
                old: json!("not found"),
                new: json!(7.0)
            }
        );
    }

    #[test]
    fn identical_records_are_unchanged() {
        let old = vec![show("A", Score::Value(8.0), 5)];
        assert!(diff(&old, &old).is_empty());

        let nan = vec![show("NaN", Score::Value(8.0), 5)];
        assert!(diff(&nan, &nan).is_empty());
    }

    #[test]
    fn numeric_looking_text_compares_as_text() {
        let old = show("A", Score::Value(8.0), 5).with_temporal("2020");
        let mut new = show("A", Score::Value(8.0), 5).with_temporal("2020.0");
        let changes = field_diff(&old, &new);
        assert_eq!(changes.keys().copied().collect::<Vec<_>>(), ["premiere"]);

        let mut old = old;
        old.temporal = new.temporal.clone();
        old.external_id = Some("0123".to_string());
        new.external_id = Some("123".to_string());
        assert_eq!(
            field_diff(&old, &new)["id"],
            FieldChange {
                old: json!("0123"),
                new: json!("123")
            }
        );
    }

    #[test]
    fn numeric_fields_compare_by_value() {
        let old = show("A", Score::Value(8.0), 5);
        let mut new = old.clone();
        new.rating = Score::parse("8.00");
        assert!(field_diff(&old, &new).is_empty());
    }

    #[test]
    fn changelog_shape() {
        let old = vec![show("Show A", Score::Value(8.0), 500)];
        let new = vec![show("Show A", Score::Value(8.5), 600)];
        let value = serde_json::to_value(diff(&old, &new)).unwrap();
        assert_eq!(value["Added"], json!([]));
        assert_eq!(value["Updated"][0]["Key"], json!("show a|x|2024-01-01"));
        assert_eq!(value["Updated"][0]["New"]["Rating"], json!(8.5));
        assert_eq!(value["Updated"][0]["Diff"]["votes"]["Old"], json!(500));
    }
}
