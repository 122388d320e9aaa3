//! Date parsing: any reasonably common textual date -> ISO `YYYY-MM-DD`.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

/// Formats tried first, in order, standing in for a "robust" multi-format
/// parser. A hit here is high-confidence (0.9): the format is unambiguous.
const ROBUST_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d.%m.%Y",
];

lazy_static! {
    /// Regex/format pairs used when the robust pass fails — covers
    /// shorthand years and loosely-delimited digit groups.
    static ref FALLBACK_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap(), "%Y-%m-%d"),
        (Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap(), "%m/%d/%Y"),
        (Regex::new(r"^\d{1,2}/\d{1,2}/\d{2}$").unwrap(), "%m/%d/%y"),
        (Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").unwrap(), "%m-%d-%Y"),
    ];
}

/// Parses `date_string` to ISO `YYYY-MM-DD`, returning `(iso_date,
/// confidence)`. Returns `None` when nothing recognizable is found.
pub fn parse_date(date_string: &str) -> Option<(String, f64)> {
    let trimmed = date_string.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in ROBUST_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some((d.format("%Y-%m-%d").to_string(), 0.9));
        }
    }

    for (re, fmt) in FALLBACK_PATTERNS.iter() {
        if re.is_match(trimmed) {
            if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                return Some((d.format("%Y-%m-%d").to_string(), 0.8));
            }
        }
    }

    None
}
