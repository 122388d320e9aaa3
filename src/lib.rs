//! DQ-PIPELINE Library
//! Data Quality Detection & Repair Pipeline

pub mod agents;
pub mod analyzer;
pub mod applier;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod source;

pub use error::{DqError, Result};

use analyzer::{analyze, ColumnAnalysis};
use applier::{apply_fixes, ApplyMode, ApplyResult};
use llm::LlmGateway;
use model::{ChangeMap, Dataset, Issue, Row, RunSummary};
use orchestrator::Orchestrator;
use source::{dataset_to_csv_bytes, ArtifactSink, CsvArtifactSink};
use std::collections::HashMap;
use std::sync::Arc;

/// C1 + C5: profiles `dataset`'s columns once, then runs every detector
/// against it in the fixed dependency order.
pub async fn detect_issues(
    dataset: &Dataset,
    orchestrator: &Orchestrator,
    llm: Option<Arc<dyn LlmGateway>>,
) -> (Vec<Issue>, RunSummary) {
    let profiles = Arc::new(analyze(dataset));
    let rows = Arc::new(dataset.rows.clone());
    orchestrator.detect_issues(rows, profiles, llm).await
}

/// Outcome of `apply_fixes_mode`: the in-memory result always, plus the
/// artifact locator when `mode` wrote one.
pub struct ApplyOutcome {
    pub rows: Vec<Row>,
    pub changes: ChangeMap,
    pub applied_count: usize,
    pub locator: Option<String>,
}

/// C6, with mode dispatch. `Preview` returns the repaired rows in memory
/// only; `Export`/`Commit` additionally serialize them to CSV and write
/// through `sink` under the `{source_key}_cleaned.csv` naming rule.
/// `Commit` differs from `Export` only in the caller's intent (overwriting
/// the source of record versus producing a side artifact) — both write
/// through the same sink here.
pub fn apply_fixes_mode(
    rows: &[Row],
    columns: &[String],
    selected: &[Issue],
    unit_preferences: &HashMap<String, String>,
    mode: ApplyMode,
    source_key: &str,
    sink: &dyn ArtifactSink,
) -> Result<ApplyOutcome> {
    let ApplyResult { rows, changes, applied_count } = apply_fixes(rows, selected, unit_preferences);

    let locator = match mode {
        ApplyMode::Preview => None,
        ApplyMode::Export | ApplyMode::Commit => {
            let dataset = Dataset::new(columns.to_vec(), rows.clone());
            let bytes = dataset_to_csv_bytes(&dataset)?;
            let key = CsvArtifactSink::cleaned_key(source_key);
            Some(sink.put(&key, &bytes, "text/csv")?)
        }
    };

    Ok(ApplyOutcome { rows, changes, applied_count, locator })
}

/// Re-exported for callers that already have a `ColumnAnalysis` and want
/// to skip re-profiling (e.g. a CLI that prints column summaries before
/// running detection).
pub fn profile_columns(dataset: &Dataset) -> ColumnAnalysis {
    analyze(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::source::CsvArtifactSink;

    fn row(id: usize, email: &str) -> Row {
        let mut r = Row::new(id);
        r.push("email", Value::from_str_cell(email));
        r
    }

    #[tokio::test]
    async fn detect_issues_runs_the_full_pipeline() {
        let rows = vec![row(0, "bad-email"), row(1, "good@example.com")];
        let dataset = Dataset::new(vec!["email".to_string()], rows);
        let orchestrator = Orchestrator::new(None, 300);
        let (issues, summary) = detect_issues(&dataset, &orchestrator, None).await;
        assert!(issues.iter().any(|i| i.category == "EmailValidation"));
        assert_eq!(summary.total_rows_scanned, 2);
    }

    #[test]
    fn preview_mode_never_touches_the_sink() {
        let rows = vec![row(0, "bad-email")];
        let columns = vec!["email".to_string()];
        let outcome = apply_fixes_mode(
            &rows,
            &columns,
            &[],
            &HashMap::new(),
            ApplyMode::Preview,
            "customers.csv",
            &CsvArtifactSink::new(std::env::temp_dir()),
        )
        .unwrap();
        assert!(outcome.locator.is_none());
    }

    #[test]
    fn export_mode_writes_through_the_sink() {
        let rows = vec![row(0, "bad-email")];
        let columns = vec!["email".to_string()];
        let dir = std::env::temp_dir().join(format!("dq-pipeline-lib-test-{}", std::process::id()));
        let outcome = apply_fixes_mode(
            &rows,
            &columns,
            &[],
            &HashMap::new(),
            ApplyMode::Export,
            "customers.csv",
            &CsvArtifactSink::new(&dir),
        )
        .unwrap();
        assert!(outcome.locator.as_deref().unwrap().ends_with("customers_cleaned.csv"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
