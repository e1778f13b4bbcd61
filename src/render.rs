//! BibTeX rendering of gap candidates.

use crate::gaps::ReferenceFrequency;
use crate::paper::RemoteReference;
use std::collections::HashMap;

/// Used when a reference has no author to derive a key from
const UNKNOWN_AUTHOR: &str = "unknown";

/// Last token of the first author, lowercased, followed by the year.
pub fn suggested_key(reference: &RemoteReference) -> String {
    let surname = reference
        .authors
        .first()
        .and_then(|name| name.split_whitespace().last())
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    match reference.year {
        Some(year) => format!("{}{}", surname, year),
        None => surname,
    }
}

/// Render one candidate as a BibTeX entry under its suggested key.
pub fn render_entry(gap: &ReferenceFrequency) -> String {
    render_with_key(gap, &suggested_key(&gap.reference))
}

/// Render a batch, disambiguating repeated keys with `a`, `b`, ... suffixes.
pub fn render_entries(gaps: &[ReferenceFrequency]) -> String {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for gap in gaps {
        *totals.entry(suggested_key(&gap.reference)).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    gaps.iter()
        .map(|gap| {
            let base = suggested_key(&gap.reference);
            let key = if totals.get(&base).copied().unwrap_or(0) > 1 {
                let n = seen.entry(base.clone()).or_default();
                let key = format!("{}{}", base, suffix(*n));
                *n += 1;
                key
            } else {
                base
            };
            render_with_key(gap, &key)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `0 -> a`, `25 -> z`, `26 -> aa`, ...
fn suffix(mut n: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn render_with_key(gap: &ReferenceFrequency, key: &str) -> String {
    let reference = &gap.reference;
    let entry_type = if reference.venue.is_some() { "article" } else { "misc" };

    let mut fields: Vec<(&str, String)> = Vec::new();
    fields.push(("title", reference.title().unwrap_or("").to_string()));
    if !reference.authors.is_empty() {
        fields.push(("author", reference.authors.join(" and ")));
    }
    if let Some(year) = reference.year {
        fields.push(("year", year.to_string()));
    }
    if let Some(venue) = &reference.venue {
        fields.push(("journal", venue.clone()));
    }
    if let Some(doi) = reference.doi() {
        fields.push(("doi", doi));
    }
    fields.push((
        "note",
        format!(
            "Cited by {} of your sources: {}",
            gap.count,
            gap.cited_by.join(", ")
        ),
    ));

    let body = fields
        .iter()
        .map(|(name, value)| format!("  {} = {{{}}}", name, escape(value)))
        .collect::<Vec<_>>()
        .join(",\n");

    format!("@{}{{{},\n{}\n}}\n", entry_type, key, body)
}

/// Braces would unbalance the entry; drop them.
fn escape(value: &str) -> String {
    value.replace(['{', '}'], "")
}
