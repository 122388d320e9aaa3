//! Detector agents (C4): each agent inspects the dataset for one category of
//! problem and proposes fixes. Agents never see each other's output and
//! never mutate the dataset directly — they only produce `Issue`s, which the
//! orchestrator collects and the applier later reconciles.

pub mod categorical;
pub mod company_validation;
pub mod email_validation;
pub mod extraction;
pub mod formatting;
pub mod geographic_enrichment;
pub mod imputation;
pub mod logic;
pub mod semantic;
pub mod units;

use crate::analyzer::ColumnAnalysis;
use crate::llm::LlmGateway;
use crate::model::{Issue, Row};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability set every detector implements. Deliberately a trait rather
/// than a base class: agents share no state, only this shape.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue>;
}

/// Shared issue constructor mirroring what every agent used to hand-roll:
/// a deterministic id shape plus the caller-supplied fields.
pub fn make_issue(
    category: &str,
    row_id: Option<usize>,
    column: &str,
    issue_type: &str,
    dirty_value: impl Into<String>,
    suggested_value: Option<String>,
    confidence: f64,
    explanation: impl Into<String>,
    why_agentic: impl Into<String>,
) -> Issue {
    Issue {
        id: Issue::make_id(category, issue_type, row_id, column),
        row_id,
        column: column.to_string(),
        category: category.to_string(),
        issue_type: issue_type.to_string(),
        dirty_value: dirty_value.into(),
        suggested_value,
        confidence,
        explanation: explanation.into(),
        why_agentic: why_agentic.into(),
    }
}

/// Returns the agent execution order. Later agents may assume the dataset
/// state that earlier agents would have produced (e.g. Formatting assumes
/// GeographicEnrichment has already run), even though agents don't actually
/// mutate shared state — this only governs the order issues are collected.
pub const AGENT_ORDER: &[&str] = &[
    "EmailValidation",
    "GeographicEnrichment",
    "Formatting",
    "CompanyValidation",
    "Units",
    "Categorical",
    "Imputation",
    "Semantic",
    "Logic",
    "Extraction",
];
