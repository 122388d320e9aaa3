//! Orchestrator (C5): runs the ten detectors in a fixed dependency order,
//! accumulates their Issues, and builds a run summary. Each agent runs
//! inside its own task so a panic in one detector can't take down the run;
//! a soft deadline causes remaining agents to be skipped.

use crate::agents::categorical::CategoricalAgent;
use crate::agents::company_validation::CompanyValidationAgent;
use crate::agents::email_validation::EmailValidationAgent;
use crate::agents::extraction::ExtractionAgent;
use crate::agents::formatting::FormattingAgent;
use crate::agents::geographic_enrichment::GeographicEnrichmentAgent;
use crate::agents::imputation::ImputationAgent;
use crate::agents::logic::LogicAgent;
use crate::agents::semantic::SemanticAgent;
use crate::agents::units::UnitsAgent;
use crate::agents::Detector;
use crate::analyzer::ColumnAnalysis;
use crate::llm::LlmGateway;
use crate::model::{Issue, QuotaStatus, Row, RunSummary};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Instrument};

pub struct Orchestrator {
    agents: Vec<Arc<dyn Detector>>,
    deadline_seconds: u64,
}

impl Orchestrator {
    /// Builds the fixed-order agent pipeline. `imputation_columns` is
    /// forwarded to `ImputationAgent` (`None` means "every column").
    pub fn new(imputation_columns: Option<Vec<String>>, deadline_seconds: u64) -> Self {
        let agents: Vec<Arc<dyn Detector>> = vec![
            Arc::new(EmailValidationAgent),
            Arc::new(GeographicEnrichmentAgent::default()),
            Arc::new(FormattingAgent),
            Arc::new(CompanyValidationAgent::default()),
            Arc::new(UnitsAgent),
            Arc::new(CategoricalAgent),
            Arc::new(ImputationAgent::new(imputation_columns)),
            Arc::new(SemanticAgent::default()),
            Arc::new(LogicAgent),
            Arc::new(ExtractionAgent),
        ];
        Self { agents, deadline_seconds }
    }

    /// Runs every agent in order against `rows`, stopping early (and
    /// marking the summary `partial`) if the soft deadline elapses.
    pub async fn detect_issues(
        &self,
        rows: Arc<Vec<Row>>,
        profiles: Arc<ColumnAnalysis>,
        llm: Option<Arc<dyn LlmGateway>>,
    ) -> (Vec<Issue>, RunSummary) {
        let run_span = info_span!("orchestration_run", rows = rows.len());
        let _guard = run_span.enter();

        let deadline = Instant::now() + Duration::from_secs(self.deadline_seconds);
        let mut issues = Vec::new();
        let mut agent_failures = Vec::new();
        let mut partial = false;

        for agent in &self.agents {
            if Instant::now() >= deadline {
                partial = true;
                info!("orchestration deadline reached, skipping remaining agents");
                break;
            }

            let name = agent.name();
            let agent = Arc::clone(agent);
            let rows = Arc::clone(&rows);
            let profiles = Arc::clone(&profiles);
            let llm = llm.clone();
            let span = info_span!("agent", agent = name);

            let result = tokio::spawn(async move { agent.run(&rows, &profiles, llm.as_ref()).await }.instrument(span)).await;

            match result {
                Ok(found) => {
                    info!(agent = name, issues = found.len(), "agent completed");
                    issues.extend(found);
                }
                Err(join_error) => {
                    let message = if join_error.is_panic() { "agent panicked".to_string() } else { join_error.to_string() };
                    error!(agent = name, %message, "agent failed");
                    agent_failures.push((name.to_string(), message));
                }
            }
        }

        let quota_status = llm.as_ref().and_then(|gateway| gateway.quota_status());
        let summary = build_summary(rows.len(), &issues, quota_status, partial, agent_failures);
        (issues, summary)
    }
}

fn build_summary(
    total_rows_scanned: usize,
    issues: &[Issue],
    quota_status: Option<QuotaStatus>,
    partial: bool,
    agent_failures: Vec<(String, String)>,
) -> RunSummary {
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut issue_type_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut rows_affected: HashSet<usize> = HashSet::new();

    for issue in issues {
        *category_counts.entry(issue.category.clone()).or_insert(0) += 1;
        *issue_type_counts.entry(issue.issue_type.clone()).or_insert(0) += 1;
        if let Some(row_id) = issue.row_id {
            rows_affected.insert(row_id);
        }
    }

    let rows_affected_percent =
        if total_rows_scanned == 0 { 0.0 } else { rows_affected.len() as f64 / total_rows_scanned as f64 * 100.0 };

    RunSummary {
        total_rows_scanned,
        total_issues: issues.len(),
        rows_affected: rows_affected.len(),
        rows_affected_percent,
        category_counts,
        issue_type_counts,
        quota_status,
        partial,
        agent_failures,
    }
}
