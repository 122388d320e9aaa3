//! Shared data model: rows, column profiles, issues, and change provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single cell value. Tabular sources never carry richer types than this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    String(String),
    Null,
}

impl Value {
    pub fn from_str_cell(raw: &str) -> Self {
        if raw.is_empty() {
            Value::Null
        } else {
            Value::String(raw.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
        }
    }

    /// True for null and the common textual stand-ins for "missing"
    /// (`""`, `"NULL"`, `"N/A"`, `"NA"`, `"null"`, `"none"`).
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => {
                let t = s.trim();
                t.is_empty()
                    || matches!(
                        t.to_ascii_uppercase().as_str(),
                        "NULL" | "N/A" | "NA" | "NONE"
                    )
            }
            Value::Number(_) => false,
        }
    }
}

/// An ordered column-name -> cell-value mapping. Column width is typically
/// small (tens of columns), so a flat vector beats a hash map for the
/// lookups this crate performs (iterate-all, occasional point get/set).
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub id: usize,
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            cells: Vec::new(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn set(&mut self, column: &str, value: Value) {
        if let Some(slot) = self.cells.iter_mut().find(|(c, _)| c == column) {
            slot.1 = value;
        } else {
            self.cells.push((column.to_string(), value));
        }
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.cells.iter().any(|(c, _)| c == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }
}

/// A finite sequence of rows sharing one column set.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Email,
    Phone,
    Date,
    Numeric,
    Text,
}

/// Per-column statistics produced once by the Column Analyzer and read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: InferredType,
    pub unique_count: usize,
    pub non_null_count: usize,
    pub sample_values: Vec<String>,
    pub most_common_value: Option<String>,
    pub most_common_count: usize,
    /// Present only when `inferred_type == Email`.
    pub most_common_domain: Option<String>,
    /// Present only when `inferred_type == Phone`.
    pub country_hint: Option<String>,
}

/// A detected defect plus a proposed repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub row_id: Option<usize>,
    pub column: String,
    pub category: String,
    pub issue_type: String,
    pub dirty_value: String,
    /// `None` means "clear the cell" (used for impossible values such as a
    /// job-start-date preceding a birth-date).
    pub suggested_value: Option<String>,
    pub confidence: f64,
    pub explanation: String,
    pub why_agentic: String,
}

impl Issue {
    /// Builds the `{category}_{issue_type}_{row_id|dataset}_{column}_{random8}`
    /// identifier shared by every detector.
    pub fn make_id(category: &str, issue_type: &str, row_id: Option<usize>, column: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let row_part = row_id
            .map(|r| r.to_string())
            .unwrap_or_else(|| "dataset".to_string());
        format!(
            "{category}_{issue_type}_{row_part}_{column}_{}",
            &suffix[..8]
        )
    }
}

/// A single recorded cell change: `old_value` is what was overwritten,
/// `new_value` of `None` denotes explicit clearing ("null").
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// The per-cell diff between an input and output dataset, keyed by
/// `(row_id, column)` for stable, order-independent lookups.
#[derive(Debug, Clone, Default)]
pub struct ChangeMap {
    entries: BTreeMap<(usize, String), Change>,
}

impl ChangeMap {
    pub fn record(&mut self, row_id: usize, column: &str, old_value: Option<String>, new_value: Option<String>) {
        self.entries
            .insert((row_id, column.to_string()), Change { old_value, new_value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row_id: usize, column: &str) -> Option<&Change> {
        self.entries.get(&(row_id, column.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, String), &Change)> {
        self.entries.iter()
    }
}

/// Surfaced by the LLM Gateway when quota pressure affects a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub exhausted: bool,
    pub working_model: Option<String>,
    pub message: String,
}

/// Produced by the Orchestrator after running every detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_rows_scanned: usize,
    pub total_issues: usize,
    pub rows_affected: usize,
    pub rows_affected_percent: f64,
    pub category_counts: BTreeMap<String, usize>,
    pub issue_type_counts: BTreeMap<String, usize>,
    pub quota_status: Option<QuotaStatus>,
    pub partial: bool,
    /// `(agent_name, message)` pairs for agents that raised during their run.
    pub agent_failures: Vec<(String, String)>,
}

/// Cooperative cancellation shared between the orchestrator's deadline timer
/// and any caller-initiated cancel.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_get_set_roundtrip() {
        let mut row = Row::new(0);
        row.push("email", Value::String("a@b.com".into()));
        assert_eq!(row.get("email").unwrap().as_str(), Some("a@b.com"));
        row.set("email", Value::String("c@d.com".into()));
        assert_eq!(row.get("email").unwrap().as_str(), Some("c@d.com"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn value_is_missing_covers_common_markers() {
        assert!(Value::Null.is_missing());
        assert!(Value::String("".into()).is_missing());
        assert!(Value::String("N/A".into()).is_missing());
        assert!(Value::String("none".into()).is_missing());
        assert!(!Value::String("Mumbai".into()).is_missing());
    }

    #[test]
    fn issue_id_has_expected_shape() {
        let id = Issue::make_id("EmailValidation", "InvalidEmail", Some(3), "email");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "EmailValidation");
        assert_eq!(parts[1], "InvalidEmail");
        assert_eq!(parts[2], "3");
        assert_eq!(parts[3], "email");
        assert_eq!(parts[4].len(), 8);
    }

    #[test]
    fn change_map_keeps_last_write_per_cell() {
        let mut cm = ChangeMap::default();
        cm.record(0, "state", Some("Florida".into()), Some("Maharashtra".into()));
        cm.record(0, "state", Some("Maharashtra".into()), Some("Goa".into()));
        assert_eq!(cm.len(), 1);
        assert_eq!(cm.get(0, "state").unwrap().new_value.as_deref(), Some("Goa"));
    }
}
