//! Semantic: entity resolution. Groups variant spellings of the same
//! organization/brand/vendor into one canonical name via the LLM. Never
//! touches personal-name columns — those are excluded outright, not just
//! protected at apply time.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::config::PROTECTED_PERSONAL_NAME_KEYWORDS;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use crate::normalize::EntityMatcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const CATEGORY: &str = "Semantic";

fn entity_columns(profiles: &ColumnAnalysis) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| {
            let lower = p.name.to_lowercase();
            if PROTECTED_PERSONAL_NAME_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return false;
            }
            ["company", "organization", "organisation", "org", "entity", "brand", "vendor", "supplier"]
                .iter()
                .any(|kw| lower.contains(kw))
        })
        .map(|p| p.name.clone())
        .collect()
}

async fn llm_resolve_entity(variants: &[String], llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let joined = variants.join(", ");
    let prompt = format!(
        "These values likely refer to the same entity. Return the canonical/standard name:\n\n\
        Variants: {joined}\n\nReturn ONLY a JSON object with: {{\"canonical\": \"standard_name\", \"confidence\": 0.0-1.0}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    parsed.get("canonical")?.as_str().map(|s| s.to_string())
}

pub struct SemanticAgent {
    matcher: EntityMatcher,
}

impl Default for SemanticAgent {
    fn default() -> Self {
        Self { matcher: EntityMatcher::new(0.7) }
    }
}

#[async_trait]
impl Detector for SemanticAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        if rows.is_empty() {
            return issues;
        }
        let Some(gateway) = llm else { return issues };

        for column in entity_columns(profiles) {
            let mut value_to_rows: HashMap<String, Vec<usize>> = HashMap::new();
            for row in rows {
                let Some(value) = row.get(&column) else { continue };
                let text = value.to_display_string().trim().to_string();
                if text.is_empty() {
                    continue;
                }
                value_to_rows.entry(text).or_default().push(row.id);
            }

            let unique_values: Vec<String> = value_to_rows.keys().cloned().collect();
            let mut processed = std::collections::HashSet::new();

            for value in &unique_values {
                if processed.contains(value) {
                    continue;
                }
                let similar: Vec<String> =
                    unique_values.iter().filter(|v| *v != value && self.matcher.is_match(value, v)).cloned().collect();

                if similar.is_empty() {
                    continue;
                }

                let mut variants = vec![value.clone()];
                variants.extend(similar.iter().cloned());

                if let Some(canonical) = llm_resolve_entity(&variants, gateway).await {
                    for variant in &variants {
                        if variant != &canonical {
                            for row_id in value_to_rows.get(variant).cloned().unwrap_or_default() {
                                issues.push(make_issue(
                                    CATEGORY,
                                    Some(row_id),
                                    &column,
                                    "EntityResolution",
                                    variant.clone(),
                                    Some(canonical.clone()),
                                    0.8,
                                    format!("Entity variation: '{variant}' refers to the same entity as '{canonical}'"),
                                    "Understands these all refer to the same real-world entity.",
                                ));
                            }
                            processed.insert(variant.clone());
                        }
                    }
                }
            }
        }

        issues
    }
}
