//! Just enough HTML handling for list pages and wikitables: tag stripping,
//! entity decoding and table flattening with `rowspan`/`colspan` carried.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::{Captures, Regex};

static DROPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<sup[^>]*class="[^"]*reference[^"]*"[^>]*>.*?</sup>|<style[^>]*>.*?</style>|<script[^>]*>.*?</script>"#)
        .unwrap()
});
static BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table([^>]*)>(.*?)</table>").unwrap());
static ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(td|th)\b([^>]*)>(.*?)</(?:td|th)>").unwrap());
static ROWSPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)rowspan\s*=\s*"?(\d+)"#).unwrap());
static COLSPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)colspan\s*=\s*"?(\d+)"#).unwrap());

/// Decodes the named entities list pages actually use, plus numeric ones.
/// Unknown entities are left as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |c: &Captures| {
            let name = &c[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or(name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('–'),
                    "mdash" => Some('—'),
                    "hellip" => Some('…'),
                    "lsquo" => Some('‘'),
                    "rsquo" => Some('’'),
                    "ldquo" => Some('“'),
                    "rdquo" => Some('”'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| c[0].to_string(), String::from)
        })
        .into_owned()
}

/// Visible text of an HTML fragment with whitespace collapsed. Footnote
/// markers, scripts and styles are removed.
pub fn strip_tags(fragment: &str) -> String {
    let text = DROPPED.replace_all(fragment, "");
    let text = BREAK.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    decode_entities(&text).split_whitespace().join(" ")
}

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Value of the quoted attribute `name`, matched case-insensitively.
pub fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTR.captures_iter(attrs)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| m.as_str())
}

/// Inner HTML of every `<table>` whose class list contains `class`.
pub fn tables_with_class<'a>(html: &'a str, class: &str) -> Vec<&'a str> {
    TABLE
        .captures_iter(html)
        .filter(|c| {
            attr(&c[1], "class").is_some_and(|classes| classes.split_whitespace().any(|k| k == class))
        })
        .filter_map(|c| c.get(2).map(|m| m.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// every cell in the source row was a `<th>`
    pub header: bool,
    pub cells: Vec<String>,
}

struct Carry {
    remaining: usize,
    text: String,
}

fn take_carried(cells: &mut Vec<String>, carried: &mut [Option<Carry>]) {
    while let Some(Some(carry)) = carried.get_mut(cells.len()) {
        cells.push(carry.text.clone());
        carry.remaining -= 1;
        if carry.remaining == 0 {
            carried[cells.len() - 1] = None;
        }
    }
}

/// Flattens a table into rows of plain-text cells. Spanning cells are
/// repeated into every row and column they cover.
pub fn table_rows(table: &str) -> Vec<TableRow> {
    let mut carried: Vec<Option<Carry>> = Vec::new();
    let mut rows = Vec::new();

    for row in ROW.captures_iter(table) {
        let mut cells = Vec::new();
        let mut all_th = true;
        let mut any = false;

        for cell in CELL.captures_iter(&row[1]) {
            any = true;
            all_th &= cell[1].eq_ignore_ascii_case("th");
            let span = |re: &Regex| {
                re.captures(&cell[2])
                    .and_then(|c| c[1].parse::<usize>().ok())
                    .unwrap_or(1)
                    .clamp(1, 1000)
            };
            let (rowspan, colspan) = (span(&ROWSPAN), span(&COLSPAN));
            let text = strip_tags(&cell[3]);

            take_carried(&mut cells, &mut carried);
            for _ in 0..colspan {
                let col = cells.len();
                if rowspan > 1 {
                    if carried.len() <= col {
                        carried.resize_with(col + 1, || None);
                    }
                    carried[col] = Some(Carry {
                        remaining: rowspan - 1,
                        text: text.clone(),
                    });
                }
                cells.push(text.clone());
            }
        }
        take_carried(&mut cells, &mut carried);

        if any || !cells.is_empty() {
            rows.push(TableRow {
                header: any && all_th,
                cells,
            });
        }
    }
    rows
}
