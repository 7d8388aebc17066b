use std::cmp::Ordering;

use jiff::civil::Date;

use crate::{common::Record, identity::parse_date};

/// Stand-in for non-numeric scores and unknown votes, below any real value.
const NO_SCORE: f64 = -1.0;

/// Orders records by rating desc, votes desc, date asc (unparseable last)
/// and finally title by ordinal comparison. The sort is stable.
pub fn sort(records: &mut [Record]) {
    // parse each date once instead of on every comparison
    let mut decorated: Vec<(Date, Record)> = records
        .iter_mut()
        .map(|r| (sort_date(r), std::mem::take(r)))
        .collect();
    decorated.sort_by(|(da, a), (db, b)| compare(a, *da, b, *db));
    for (slot, (_, record)) in records.iter_mut().zip(decorated) {
        *slot = record;
    }
}

pub fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    sort(&mut records);
    records
}

fn sort_date(record: &Record) -> Date {
    record
        .temporal
        .as_deref()
        .and_then(parse_date)
        .unwrap_or(Date::MAX)
}

fn compare(a: &Record, date_a: Date, b: &Record, date_b: Date) -> Ordering {
    let rating = |r: &Record| r.rating.as_number().unwrap_or(NO_SCORE);
    let votes = |r: &Record| r.votes.map_or(NO_SCORE, |v| v as f64);

    rating(b)
        .total_cmp(&rating(a))
        .then_with(|| votes(b).total_cmp(&votes(a)))
        .then_with(|| date_a.cmp(&date_b))
        .then_with(|| a.title.cmp(&b.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Score;

    fn titles(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn numeric_rating_before_sentinel() {
        let out = sorted(vec![
            Record::new("Lost").with_rating(Score::NotFound),
            Record::new("Found").with_rating(Score::Value(7.9)),
        ]);
        assert_eq!(titles(&out), ["Found", "Lost"]);
    }

    #[test]
    fn tie_breaks_in_order() {
        let out = sorted(vec![
            Record::new("e").with_rating(Score::Value(8.0)).with_votes(10),
            Record::new("d")
                .with_rating(Score::Value(8.0))
                .with_votes(20)
                .with_temporal("TBA"),
            Record::new("c")
                .with_rating(Score::Value(8.0))
                .with_votes(20)
                .with_temporal("2020-01-01"),
            Record::new("b")
                .with_rating(Score::Value(8.0))
                .with_votes(20)
                .with_temporal("2019-01-01"),
            Record::new("a").with_rating(Score::Value(9.0)),
        ]);
        assert_eq!(titles(&out), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn publication_year_breaks_ties() {
        let book = |title: &str, year: &str| {
            Record::new(title)
                .with_rating(Score::Value(4.1))
                .with_votes(100)
                .with_temporal(year)
        };
        let out = sorted(vec![book("A Newer", "2010"), book("B Older", "1997")]);
        assert_eq!(titles(&out), ["B Older", "A Newer"]);
    }

    #[test]
    fn missing_votes_sort_after_zero() {
        let out = sorted(vec![
            Record::new("none").with_rating(Score::Value(5.0)),
            Record::new("zero").with_rating(Score::Value(5.0)).with_votes(0),
        ]);
        assert_eq!(titles(&out), ["zero", "none"]);
    }

    #[test]
    fn title_is_ordinal() {
        let out = sorted(vec![Record::new("b"), Record::new("B"), Record::new("a")]);
        assert_eq!(titles(&out), ["B", "a", "b"]);
    }

    #[test]
    fn sort_is_idempotent() {
        let once = sorted(vec![
            Record::new("x").with_rating(Score::LookupError),
            Record::new("y").with_rating(Score::Value(6.5)).with_votes(3),
            Record::new("z").with_temporal("May 2001"),
            Record::new("w").with_rating(Score::Value(6.5)).with_votes(3),
        ]);
        assert_eq!(sorted(once.clone()), once);
    }
}
