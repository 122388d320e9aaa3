//! Categorical: detects low-cardinality columns, learns an "allowed" value
//! set from frequency (values appearing at least 2% of the time), and maps
//! everything else onto it by fuzzy match, falling back to the LLM for
//! values no deterministic similarity threshold clears.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use crate::normalize::fuzzy::fuzzy_match_category;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const CATEGORY: &str = "Categorical";
const FUZZY_THRESHOLD: f64 = 0.6;
const MIN_UNIQUE: usize = 2;
const MAX_UNIQUE: usize = 50;

/// Columns whose sampled unique-value count sits in `(1, 50)` — few enough
/// variants to plausibly be a fixed set of categories rather than free text.
fn categorical_columns(rows: &[Row], columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|column| {
            let mut unique = std::collections::HashSet::new();
            for row in rows.iter().take(1000) {
                if let Some(value) = row.get(column) {
                    let text = value.to_display_string().trim().to_lowercase();
                    if !text.is_empty() {
                        unique.insert(text);
                    }
                }
            }
            unique.len() > MIN_UNIQUE - 1 && unique.len() < MAX_UNIQUE
        })
        .cloned()
        .collect()
}

/// Values appearing at least `max(2, 2% of total)` times form the allowed
/// set for a column; anything rarer is treated as a candidate typo.
fn allowed_values(rows: &[Row], column: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in rows {
        if let Some(value) = row.get(column) {
            let text = value.to_display_string().trim().to_string();
            if !text.is_empty() {
                *counts.entry(text).or_insert(0) += 1;
            }
        }
    }
    let total: usize = counts.values().sum();
    let threshold = (total as f64 * 0.02).max(2.0);
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().filter(|(_, count)| *count as f64 >= threshold).map(|(v, _)| v).collect()
}

async fn llm_map_category(value: &str, allowed: &[String], llm: &Arc<dyn LlmGateway>) -> Option<(String, f64, String)> {
    let joined = allowed.join(", ");
    let prompt = format!(
        "Map this value to one of the allowed categories: \"{value}\"\n\nAllowed categories: {joined}\n\n\
        Return ONLY a JSON object with: {{\"mapped\": \"category_name\", \"confidence\": 0.0, \"explanation\": \"...\"}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let mapped = parsed.get("mapped")?.as_str()?.to_string();
    if !allowed.iter().any(|a| a == &mapped) {
        return None;
    }
    let confidence = parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.7);
    let explanation = parsed.get("explanation").and_then(|v| v.as_str()).unwrap_or("LLM-mapped category").to_string();
    Some((mapped, confidence, explanation))
}

pub struct CategoricalAgent;

#[async_trait]
impl Detector for CategoricalAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        if rows.is_empty() {
            return issues;
        }

        let all_columns: Vec<String> = profiles.profiles().keys().cloned().collect();
        let columns = categorical_columns(rows, &all_columns);

        for column in &columns {
            let allowed = allowed_values(rows, column);
            if allowed.len() < 2 {
                continue;
            }
            let allowed_lower: Vec<String> = allowed.iter().map(|v| v.to_lowercase()).collect();

            for row in rows {
                let Some(value) = row.get(column) else { continue };
                let text = value.to_display_string().trim().to_string();
                if text.is_empty() || allowed_lower.contains(&text.to_lowercase()) {
                    continue;
                }

                if let Some((suggested, confidence)) = fuzzy_match_category(&text, &allowed, FUZZY_THRESHOLD) {
                    if suggested != text {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "FuzzyMapping",
                            text.clone(),
                            Some(suggested.clone()),
                            confidence,
                            format!("Typo/variation detected: '{text}' should be '{suggested}'"),
                            "Fixes typos without needing a manual lookup table.",
                        ));
                    }
                } else if let Some(gateway) = llm {
                    if let Some((suggested, confidence, explanation)) = llm_map_category(&text, &allowed, gateway).await {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "FuzzyMapping",
                            text.clone(),
                            Some(suggested),
                            confidence,
                            explanation,
                            "LLM understands context and can map variations to correct categories.",
                        ));
                    }
                }
            }
        }

        issues
    }
}
