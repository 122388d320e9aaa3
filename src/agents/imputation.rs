//! Imputation: fills missing cells by asking the LLM to guess a plausible
//! value from the rest of the row's context. Requires an LLM gateway — there
//! is no deterministic fallback for "what value goes here". Targets every
//! missing cell in the dataset unless restricted to a specific column list.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use async_trait::async_trait;
use std::sync::Arc;

const CATEGORY: &str = "Imputation";

fn row_context(row: &Row, missing_column: &str) -> String {
    row.iter()
        .filter(|(column, value)| *column != missing_column && !value.is_missing())
        .map(|(column, value)| format!("{column}: {}", value.to_display_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn llm_impute(row: &Row, missing_column: &str, llm: &Arc<dyn LlmGateway>) -> Option<(String, f64, String)> {
    let context = row_context(row, missing_column);
    let prompt = format!(
        "Given this row data, suggest a value for the missing column '{missing_column}':\n\n\
        Row context: {{{context}}}\n\n\
        Return ONLY a JSON object with: {{\"imputed\": \"suggested_value\", \"confidence\": 0.0-1.0, \
        \"explanation\": \"brief explanation of why this value makes sense\"}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let imputed = parsed.get("imputed")?.as_str()?.to_string();
    let confidence = parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.6);
    let explanation = parsed.get("explanation").and_then(|v| v.as_str()).unwrap_or("Context-based imputation").to_string();
    Some((imputed, confidence, explanation))
}

pub struct ImputationAgent {
    pub columns: Option<Vec<String>>,
}

impl Default for ImputationAgent {
    fn default() -> Self {
        Self { columns: None }
    }
}

impl ImputationAgent {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self { columns }
    }

    fn targets(&self, column: &str) -> bool {
        match &self.columns {
            Some(allowed) => allowed.iter().any(|c| c == column),
            None => true,
        }
    }
}

#[async_trait]
impl Detector for ImputationAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], _profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let Some(gateway) = llm else { return issues };
        if rows.is_empty() {
            return issues;
        }

        for row in rows {
            let columns: Vec<String> = row.columns().map(|c| c.to_string()).collect();
            for column in &columns {
                if !self.targets(column) {
                    continue;
                }
                let Some(value) = row.get(column) else { continue };
                if !value.is_missing() {
                    continue;
                }
                let dirty = value.to_display_string();
                let dirty = if dirty.is_empty() { "NULL".to_string() } else { dirty };

                if let Some((suggested, confidence, explanation)) = llm_impute(row, column, gateway).await {
                    issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        column,
                        "ContextualFill",
                        dirty,
                        Some(suggested),
                        confidence,
                        explanation,
                        "Uses the rest of the row's context to guess the missing attribute.",
                    ));
                }
            }
        }

        issues
    }
}
