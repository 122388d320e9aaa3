//! Units: finds measurement columns, learns each column's dominant unit
//! from the data, and flags every value that doesn't already match it.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use crate::normalize::units::{convert_units, parse_units};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const CATEGORY: &str = "Units";

fn measurement_columns(profiles: &ColumnAnalysis) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| {
            let lower = p.name.to_lowercase();
            ["height", "weight", "length", "width", "distance", "size", "measurement"]
                .iter()
                .any(|kw| lower.contains(kw))
        })
        .map(|p| p.name.clone())
        .collect()
}

fn default_unit_for(column: &str) -> &'static str {
    let lower = column.to_lowercase();
    if lower.contains("weight") {
        "kg"
    } else {
        "cm"
    }
}

fn dominant_unit(column: &str, rows: &[Row]) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in rows.iter().take(1000) {
        if let Some(value) = row.get(column) {
            let raw = value.to_display_string();
            if let Some((_, unit, _)) = parse_units(raw.trim()) {
                *counts.entry(unit).or_insert(0) += 1;
            }
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, c)| *c)
        .map(|(u, _)| u)
        .unwrap_or_else(|| default_unit_for(column).to_string())
}

async fn llm_normalize_unit(value: &str, llm: &Arc<dyn LlmGateway>) -> Option<(String, f64, String)> {
    let prompt = format!(
        "Normalize this measurement to a standard unit (prefer cm for length, kg for weight): \"{value}\"\n\n\
        Return ONLY JSON: {{\"normalized\": \"123.45 cm\", \"confidence\": 0.0, \"explanation\": \"...\"}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let normalized = parsed.get("normalized")?.as_str()?.to_string();
    let confidence = parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.7);
    let explanation = parsed.get("explanation").and_then(|v| v.as_str()).unwrap_or("LLM-normalized unit").to_string();
    Some((normalized, confidence, explanation))
}

pub struct UnitsAgent;

#[async_trait]
impl Detector for UnitsAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let columns = measurement_columns(profiles);
        if columns.is_empty() {
            return issues;
        }

        let canonical_units: HashMap<String, String> = columns.iter().map(|c| (c.clone(), dominant_unit(c, rows))).collect();

        for row in rows {
            for column in &columns {
                let Some(value) = row.get(column) else { continue };
                let raw = value.to_display_string();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let canonical = canonical_units.get(column).cloned().unwrap_or_else(|| default_unit_for(column).to_string());

                if let Some((numeric_value, unit, confidence)) = parse_units(trimmed) {
                    if unit != canonical {
                        if let Some(converted) = convert_units(numeric_value, &unit, &canonical) {
                            let suggested = format!("{converted:.2} {canonical}");
                            issues.push(make_issue(
                                CATEGORY,
                                Some(row.id),
                                column,
                                "ScaleMismatch",
                                trimmed.to_string(),
                                Some(suggested),
                                confidence,
                                format!("Unit mismatch: '{trimmed}' uses {unit}. Standardizing to {canonical} (most common unit in this column)."),
                                "Learns the column's dominant unit from the data rather than assuming one.",
                            ));
                        }
                    }
                } else if let Some(gateway) = llm {
                    if let Some((suggested, confidence, explanation)) = llm_normalize_unit(trimmed, gateway).await {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "ScaleMismatch",
                            trimmed.to_string(),
                            Some(suggested),
                            confidence,
                            explanation,
                            "Falls back to the LLM for measurement strings no deterministic pattern recognizes.",
                        ));
                    }
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::model::{Dataset, Value};

    fn row(id: usize, value: &str) -> Row {
        let mut r = Row::new(id);
        r.push("height_cm", Value::from_str_cell(value));
        r
    }

    #[tokio::test]
    async fn flags_value_not_matching_dominant_unit() {
        let rows = vec![row(0, "180 cm"), row(1, "175 cm"), row(2, "170 cm"), row(3, "6 ft")];
        let ds = Dataset::new(vec!["height_cm".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = UnitsAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        let issue = issues.iter().find(|i| i.row_id == Some(3)).unwrap();
        assert!(issue.suggested_value.as_deref().unwrap().ends_with("cm"));
    }

    #[tokio::test]
    async fn consistent_units_produce_no_issues() {
        let rows = vec![row(0, "180 cm"), row(1, "175 cm"), row(2, "170 cm")];
        let ds = Dataset::new(vec!["height_cm".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = UnitsAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.is_empty());
    }
}
