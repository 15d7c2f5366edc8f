//! Strips ticker-style return-variant suffixes from portfolio display names.
//!
//! Suffixes are tried in priority order and the first one present anywhere in
//! the name wins, even when a lower-priority suffix appears earlier. With
//! [`SuffixMatch::Substring`] a suffix buried inside a word still matches, so
//! "GROWTH LEADERS" collapses to an empty name. That behaviour is kept for
//! compatibility with existing destination data; [`SuffixMatch::WordBoundary`]
//! is the fix.

use crate::config::SuffixMatch;
use crate::types::HandoverRow;

pub const SUFFIXES: [&str; 4] = ["GR", "TR", "PR", "NR"];

pub fn normalize_name(name: &str, mode: SuffixMatch) -> String {
    for suffix in SUFFIXES {
        if let Some(index) = find_suffix(name, suffix, mode) {
            return name[..index].trim().to_string();
        }
    }
    name.to_string()
}

/// Normalizes the display name of every row in place.
pub fn normalize_rows(rows: &mut [HandoverRow], mode: SuffixMatch) {
    for row in rows.iter_mut() {
        if let Some(name) = row.portfolio_name.as_deref() {
            row.portfolio_name = Some(normalize_name(name, mode));
        }
    }
}

fn find_suffix(name: &str, suffix: &str, mode: SuffixMatch) -> Option<usize> {
    match mode {
        SuffixMatch::Substring => name.find(suffix),
        SuffixMatch::WordBoundary => name.match_indices(suffix).map(|(i, _)| i).find(|&i| {
            let before = name[..i].chars().next_back();
            let after = name[i + suffix.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        }),
    }
}
