//! Column Analyzer (C1): infers a semantic type and summary statistics per
//! column over a deterministic, bounded sample.

use crate::model::{ColumnProfile, Dataset, InferredType, Row};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

const SAMPLE_SIZE: usize = 1000;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"(?i)^[^@]+@[^@]+\.[a-z]{2,}$").unwrap();
    static ref PHONE_RE: Vec<Regex> = vec![
        Regex::new(r"\+?\d{10,}").unwrap(),
        Regex::new(r"\+91").unwrap(),
        Regex::new(r"\+1").unwrap(),
    ];
    static ref DATE_RE: Vec<Regex> = vec![
        Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap(),
        Regex::new(r"\d{2}/\d{2}/\d{4}").unwrap(),
        Regex::new(r"\d{2}-\d{2}-\d{4}").unwrap(),
    ];
    static ref NUMERIC_RE: Regex = Regex::new(r"^\d+\.?\d*$").unwrap();
    static ref IN_PHONE_RE: Regex = Regex::new(r"^91\d{10}").unwrap();
    static ref US_PHONE_RE: Regex = Regex::new(r"^1\d{10}").unwrap();
    static ref NON_DIGIT_RE: Regex = Regex::new(r"[^\d+]").unwrap();
    static ref DATE_KEYWORDS: [&'static str; 8] =
        ["date", "time", "created", "updated", "timestamp", "dob", "birth", "start"];
}

/// `{column -> ColumnProfile}`, produced once per orchestration run.
pub struct ColumnAnalysis {
    profiles: BTreeMap<String, ColumnProfile>,
}

impl ColumnAnalysis {
    pub fn get(&self, column: &str) -> Option<&ColumnProfile> {
        self.profiles.get(column)
    }

    pub fn profiles(&self) -> &BTreeMap<String, ColumnProfile> {
        &self.profiles
    }

    /// Columns whose inferred type is `date`, or whose name looks date-ish
    /// (`date`, `time`, `created`, `updated`, `timestamp`, `dob`, `birth`,
    /// `start`, `end`) — used by Formatting and Logic.
    pub fn date_columns(&self) -> Vec<&str> {
        self.profiles
            .values()
            .filter(|p| {
                p.inferred_type == InferredType::Date
                    || DATE_KEYWORDS.iter().any(|kw| p.name.to_lowercase().contains(kw))
                    || p.name.to_lowercase().contains("end")
            })
            .map(|p| p.name.as_str())
            .collect()
    }

    /// A short digest used to ground LLM prompts in what a column actually
    /// contains, rather than hardcoded assumptions.
    pub fn data_context(&self, column: &str) -> String {
        match self.profiles.get(column) {
            Some(p) if p.non_null_count > 0 => format!(
                "Column '{}' has {} values, {} unique. Most common: {}",
                p.name,
                p.non_null_count,
                p.unique_count,
                p.most_common_value.clone().unwrap_or_default()
            ),
            _ => format!("Column '{column}' has no values"),
        }
    }
}

/// Analyzes a dataset (over a deterministic contiguous-prefix sample of up
/// to 1000 rows) to determine each column's semantic type.
pub fn analyze(dataset: &Dataset) -> ColumnAnalysis {
    let sample: Vec<&Row> = dataset.rows.iter().take(SAMPLE_SIZE).collect();
    let mut profiles = BTreeMap::new();

    let country_column = dataset.columns.iter().find(|c| c.to_lowercase().contains("country"));
    let country_values: Vec<String> = match country_column {
        Some(column) => sample
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| !v.is_missing())
            .map(|v| v.to_display_string().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    };

    for column in &dataset.columns {
        let values: Vec<String> = sample
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| !v.is_missing())
            .map(|v| v.to_display_string().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if values.is_empty() {
            continue;
        }

        let inferred_type = infer_type(&values);
        let unique_count = values.iter().collect::<HashSet<_>>().len();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in &values {
            *counts.entry(v.as_str()).or_insert(0) += 1;
        }
        let (most_common_value, most_common_count) = counts
            .iter()
            .max_by_key(|(_, c)| **c)
            .map(|(v, c)| (Some(v.to_string()), *c))
            .unwrap_or((None, 0));

        let most_common_domain = if inferred_type == InferredType::Email {
            most_common_email_domain(&values)
        } else {
            None
        };
        let country_hint = if inferred_type == InferredType::Phone {
            Some(detect_phone_country_hint(&values, &country_values))
        } else {
            None
        };

        profiles.insert(
            column.clone(),
            ColumnProfile {
                name: column.clone(),
                inferred_type,
                unique_count,
                non_null_count: values.len(),
                sample_values: values.iter().take(10).cloned().collect(),
                most_common_value,
                most_common_count,
                most_common_domain,
                country_hint,
            },
        );
    }

    ColumnAnalysis { profiles }
}

fn infer_type(values: &[String]) -> InferredType {
    let total = values.len() as f64;

    let email_count = values.iter().filter(|v| EMAIL_RE.is_match(v)).count() as f64;
    if email_count > total * 0.5 {
        return InferredType::Email;
    }

    let phone_count = values
        .iter()
        .filter(|v| PHONE_RE.iter().any(|re| re.is_match(v)))
        .count() as f64;
    if phone_count > total * 0.3 {
        return InferredType::Phone;
    }

    let date_count = values
        .iter()
        .filter(|v| DATE_RE.iter().any(|re| re.is_match(v)))
        .count() as f64;
    if date_count > total * 0.3 {
        return InferredType::Date;
    }

    let numeric_count = values.iter().filter(|v| NUMERIC_RE.is_match(v)).count() as f64;
    if numeric_count > total * 0.7 {
        return InferredType::Numeric;
    }

    InferredType::Text
}

fn most_common_email_domain(values: &[String]) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in values {
        if let Some((_, domain)) = v.split_once('@') {
            *counts.entry(domain.to_lowercase()).or_insert(0) += 1;
        }
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(d, _)| d)
}

/// Resolves a country-ish name to an ISO hint, for the sibling-column
/// fallback below.
fn country_name_hint(country_values: &[String]) -> Option<String> {
    for v in country_values {
        let lower = v.to_lowercase();
        if lower.contains("india") {
            return Some("IN".to_string());
        }
        if lower.contains("united states") || lower == "usa" || lower == "us" {
            return Some("US".to_string());
        }
    }
    None
}

/// Prefers an explicit `+91`/`+1` (or raw national-format) pattern in the
/// phone values themselves; falls back to a sibling `country` column when
/// neither pattern is found, and only then defaults to US.
fn detect_phone_country_hint(values: &[String], country_values: &[String]) -> String {
    for v in values {
        let digits = NON_DIGIT_RE.replace_all(v, "");
        if v.contains("+91") || IN_PHONE_RE.is_match(&digits) {
            return "IN".to_string();
        }
    }
    for v in values {
        let digits = NON_DIGIT_RE.replace_all(v, "");
        if v.contains("+1") || US_PHONE_RE.is_match(&digits) {
            return "US".to_string();
        }
    }
    country_name_hint(country_values).unwrap_or_else(|| "US".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn dataset(column: &str, values: &[&str]) -> Dataset {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut row = Row::new(i);
                row.push(column, Value::from_str_cell(v));
                row
            })
            .collect();
        Dataset::new(vec![column.to_string()], rows)
    }

    #[test]
    fn detects_email_column() {
        let ds = dataset("email", &["a@b.com", "c@d.com", "e@f.com", "not-an-email"]);
        let analysis = analyze(&ds);
        assert_eq!(analysis.get("email").unwrap().inferred_type, InferredType::Email);
    }

    #[test]
    fn detects_phone_column_with_india_hint() {
        let ds = dataset("phone", &["+919876543210", "+919876543211", "text"]);
        let analysis = analyze(&ds);
        let profile = analysis.get("phone").unwrap();
        assert_eq!(profile.inferred_type, InferredType::Phone);
        assert_eq!(profile.country_hint.as_deref(), Some("IN"));
    }

    #[test]
    fn inherits_country_hint_from_sibling_country_column_when_phone_pattern_is_ambiguous() {
        let rows = vec![
            {
                let mut row = Row::new(0);
                row.push("phone", Value::from_str_cell("9876543210"));
                row.push("country", Value::from_str_cell("India"));
                row
            },
            {
                let mut row = Row::new(1);
                row.push("phone", Value::from_str_cell("9876500000"));
                row.push("country", Value::from_str_cell("India"));
                row
            },
        ];
        let ds = Dataset::new(vec!["phone".to_string(), "country".to_string()], rows);
        let analysis = analyze(&ds);
        let profile = analysis.get("phone").unwrap();
        assert_eq!(profile.country_hint.as_deref(), Some("IN"));
    }

    #[test]
    fn falls_back_to_text() {
        let ds = dataset("notes", &["hello world", "another note", "third note"]);
        let analysis = analyze(&ds);
        assert_eq!(analysis.get("notes").unwrap().inferred_type, InferredType::Text);
    }

    #[test]
    fn detects_numeric_column() {
        let ds = dataset("age", &["25", "30", "45.5", "22"]);
        let analysis = analyze(&ds);
        assert_eq!(analysis.get("age").unwrap().inferred_type, InferredType::Numeric);
    }
}
