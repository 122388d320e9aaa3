//! GeographicEnrichment: fills in missing/incorrect state and country data
//! from city names, City -> State -> Country, using the LLM's geographic
//! knowledge (no hardcoded city/state tables). Runs before Formatting so
//! that later standardization sees corrected geography.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row, Value};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

const CATEGORY: &str = "GeographicEnrichment";

fn find_columns(profiles: &ColumnAnalysis, keywords: &[&str]) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| keywords.iter().any(|kw| p.name.to_lowercase().contains(kw)))
        .map(|p| p.name.clone())
        .collect()
}

fn cell_text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(|v| {
        if v.is_missing() {
            None
        } else {
            let s = v.to_display_string().trim().to_string();
            if s.is_empty() { None } else { Some(s) }
        }
    })
}

async fn ask_geography(llm: &Arc<dyn LlmGateway>, question: &str, field: &str) -> Option<String> {
    let cancel = CancellationToken::new();
    let response = llm.complete(question, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    parsed.get(field)?.as_str().map(|s| s.to_string())
}

async fn find_state_from_city(city: &str, country: Option<&str>, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let context = country.map(|c| format!(" in {c}")).unwrap_or_default();
    let prompt = format!(
        "What state/province is the city \"{city}\"{context} located in? Use your geographic knowledge. \
        Return the full official name. Return ONLY JSON: {{\"state\": \"State Name\", \"confidence\": 0.0}}. \
        If unsure, return {{\"state\": null, \"confidence\": 0.0}}."
    );
    ask_geography(llm, &prompt, "state").await
}

async fn find_country_from_state(state: &str, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let prompt = format!(
        "What country is the state/province \"{state}\" located in? Return ONLY JSON: \
        {{\"country\": \"Country Name\", \"confidence\": 0.0}}. If unsure, return {{\"country\": null, \"confidence\": 0.0}}."
    );
    ask_geography(llm, &prompt, "country").await
}

async fn find_country_from_city(city: &str, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let prompt = format!(
        "What country is the city \"{city}\" located in? Return ONLY JSON: \
        {{\"country\": \"Country Name\", \"confidence\": 0.0}}. If unsure, return {{\"country\": null, \"confidence\": 0.0}}."
    );
    ask_geography(llm, &prompt, "country").await
}

fn normalize_for_compare(s: &str) -> String {
    s.trim().trim_start_matches(|c: char| c.is_ascii_digit()).trim().to_lowercase()
}

const AI_UNAVAILABLE_MARKER: &str = "[AI unavailable]";

/// Degraded-mode pass used when no LLM is configured: emits low-confidence
/// `Missing*` issues for rows that have a city but no state/country, rather
/// than silently skipping the whole agent.
fn degraded_missing_geo_issues(rows: &[Row], city_columns: &[String], state_columns: &[String], country_columns: &[String]) -> Vec<Issue> {
    let mut issues = Vec::new();

    for row in rows {
        let Some(city) = city_columns.iter().find_map(|c| cell_text(row, c)) else { continue };

        if let Some(state_col) = state_columns.first() {
            if cell_text(row, state_col).is_none() {
                issues.push(make_issue(
                    CATEGORY,
                    Some(row.id),
                    state_col,
                    "MissingState",
                    "",
                    Some(AI_UNAVAILABLE_MARKER.to_string()),
                    0.40,
                    format!("State is missing for city '{city}'; no LLM is configured to infer it."),
                    "Flags missing state with a placeholder suggestion when geographic inference is unavailable.",
                ));
            }
        }

        if let Some(country_col) = country_columns.first() {
            if cell_text(row, country_col).is_none() {
                issues.push(make_issue(
                    CATEGORY,
                    Some(row.id),
                    country_col,
                    "MissingCountry",
                    "",
                    Some(AI_UNAVAILABLE_MARKER.to_string()),
                    0.40,
                    format!("Country is missing for city '{city}'; no LLM is configured to infer it."),
                    "Flags missing country with a placeholder suggestion when geographic inference is unavailable.",
                ));
            }
        }
    }

    issues
}

pub struct GeographicEnrichmentAgent {
    city_state_cache: DashMap<String, String>,
    state_country_cache: DashMap<String, String>,
    city_country_cache: DashMap<String, String>,
}

impl Default for GeographicEnrichmentAgent {
    fn default() -> Self {
        Self {
            city_state_cache: DashMap::new(),
            state_country_cache: DashMap::new(),
            city_country_cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl Detector for GeographicEnrichmentAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let city_columns = find_columns(profiles, &["city", "town", "location", "place"]);
        if city_columns.is_empty() {
            return issues;
        }

        let state_columns = find_columns(profiles, &["state", "province", "region", "territory", "district", "county"]);
        let country_columns = find_columns(profiles, &["country", "nation", "nationality"]);

        let Some(gateway) = llm else {
            return degraded_missing_geo_issues(rows, &city_columns, &state_columns, &country_columns);
        };

        for row in rows {
            let Some(city) = city_columns.iter().find_map(|c| cell_text(row, c)) else { continue };
            let state_col = state_columns.first().cloned();
            let state_value = state_col.as_ref().and_then(|c| cell_text(row, c));
            let country_col = country_columns.first().cloned().unwrap_or_else(|| "country".to_string());
            let country_value = cell_text(row, &country_col);

            if let Some(state_col) = &state_col {
                let correct_state = if let Some(cached) = self.city_state_cache.get(&city) {
                    Some(cached.clone())
                } else {
                    let found = find_state_from_city(&city, country_value.as_deref(), gateway).await;
                    if let Some(s) = &found {
                        self.city_state_cache.insert(city.clone(), s.clone());
                    }
                    found
                };

                match (&state_value, &correct_state) {
                    (None, Some(correct)) => issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        state_col,
                        "MissingState",
                        "",
                        Some(correct.clone()),
                        0.85,
                        format!("State is missing for city '{city}'. Inferred state is '{correct}'."),
                        "Infers state from city using geographic knowledge.",
                    )),
                    (None, Option::None) => issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        state_col,
                        "MissingState",
                        "",
                        None,
                        0.4,
                        format!("State is missing for city '{city}' and could not be determined."),
                        "Flags missing state when geographic lookup is unavailable.",
                    )),
                    (Some(current), Some(correct)) if normalize_for_compare(current) != normalize_for_compare(correct) => {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            state_col,
                            "IncorrectState",
                            current.clone(),
                            Some(correct.clone()),
                            0.9,
                            format!("State '{current}' is incorrect for city '{city}'. Correct state is '{correct}'."),
                            "Cross-checks the recorded state against the city using geographic knowledge.",
                        ))
                    }
                    _ => {}
                }

                if let Some(correct_state) = &correct_state {
                    let suggested_country = if let Some(cached) = self.state_country_cache.get(correct_state) {
                        Some(cached.clone())
                    } else {
                        let found = find_country_from_state(correct_state, gateway).await;
                        let found = match found {
                            Some(c) => Some(c),
                            None => find_country_from_city(&city, gateway).await,
                        };
                        if let Some(c) = &found {
                            self.state_country_cache.insert(correct_state.clone(), c.clone());
                        }
                        found
                    };

                    if let Some(suggested) = suggested_country {
                        match &country_value {
                            None => issues.push(make_issue(
                                CATEGORY,
                                Some(row.id),
                                &country_col,
                                "MissingCountry",
                                "",
                                Some(suggested.clone()),
                                0.85,
                                format!("Country inferred from state '{correct_state}' (determined from city '{city}')."),
                                "Derives country from the resolved state for consistency.",
                            )),
                            Some(current) if normalize_for_compare(current) != normalize_for_compare(&suggested) => {
                                issues.push(make_issue(
                                    CATEGORY,
                                    Some(row.id),
                                    &country_col,
                                    "IncorrectCountry",
                                    current.clone(),
                                    Some(suggested.clone()),
                                    0.85,
                                    format!("Country '{current}' is incorrect for state '{correct_state}'. Correct country is '{suggested}'."),
                                    "Validates country consistency against the resolved state.",
                                ))
                            }
                            _ => {}
                        }
                    }
                }
            } else if country_value.is_none() {
                let suggested_country = if let Some(cached) = self.city_country_cache.get(&city) {
                    Some(cached.clone())
                } else {
                    let found = find_country_from_city(&city, gateway).await;
                    if let Some(c) = &found {
                        self.city_country_cache.insert(city.clone(), c.clone());
                    }
                    found
                };

                issues.push(make_issue(
                    CATEGORY,
                    Some(row.id),
                    &country_col,
                    "MissingCountry",
                    "",
                    suggested_country.clone(),
                    if suggested_country.is_some() { 0.75 } else { 0.35 },
                    format!(
                        "Country is missing for city '{city}'{}.",
                        suggested_country.as_ref().map(|c| format!(". Suggested: '{c}'")).unwrap_or_default()
                    ),
                    "Infers country directly from city when no state column exists.",
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::llm::StubGateway;
    use crate::model::Dataset;
    use std::sync::Arc;

    fn make_row(id: usize, city: &str, state: &str, country: &str) -> Row {
        let mut row = Row::new(id);
        row.push("city", Value::from_str_cell(city));
        row.push("state", Value::from_str_cell(state));
        row.push("country", Value::from_str_cell(country));
        row
    }

    #[tokio::test]
    async fn infers_missing_state_and_country_from_city() {
        let rows = vec![make_row(0, "Mumbai", "", "")];
        let ds = Dataset::new(vec!["city".into(), "state".into(), "country".into()], rows.clone());
        let profiles = analyze(&ds);

        let gateway: Arc<dyn LlmGateway> = Arc::new(
            StubGateway::new()
                .with_response("state/province", r#"{"state": "Maharashtra", "confidence": 0.9}"#)
                .with_response("country", r#"{"country": "India", "confidence": 0.9}"#),
        );

        let agent = GeographicEnrichmentAgent::default();
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;

        assert!(issues.iter().any(|i| i.issue_type == "MissingState" && i.suggested_value.as_deref() == Some("Maharashtra")));
        assert!(issues.iter().any(|i| i.issue_type == "MissingCountry" && i.suggested_value.as_deref() == Some("India")));
    }

    #[tokio::test]
    async fn flags_incorrect_state() {
        let rows = vec![make_row(0, "Mumbai", "Gujarat", "India")];
        let ds = Dataset::new(vec!["city".into(), "state".into(), "country".into()], rows.clone());
        let profiles = analyze(&ds);

        let gateway: Arc<dyn LlmGateway> = Arc::new(
            StubGateway::new()
                .with_response("state/province", r#"{"state": "Maharashtra", "confidence": 0.9}"#)
                .with_response("country", r#"{"country": "India", "confidence": 0.9}"#),
        );

        let agent = GeographicEnrichmentAgent::default();
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;

        let state_issue = issues.iter().find(|i| i.issue_type == "IncorrectState").unwrap();
        assert_eq!(state_issue.suggested_value.as_deref(), Some("Maharashtra"));
    }

    #[tokio::test]
    async fn emits_low_confidence_missing_issues_when_llm_is_unavailable() {
        let rows = vec![make_row(0, "Mumbai", "", "")];
        let ds = Dataset::new(vec!["city".into(), "state".into(), "country".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = GeographicEnrichmentAgent::default();
        let issues = agent.run(&rows, &profiles, None).await;

        let state_issue = issues.iter().find(|i| i.issue_type == "MissingState").unwrap();
        assert_eq!(state_issue.confidence, 0.40);
        assert!(state_issue.suggested_value.as_deref().unwrap().contains("unavailable"));

        let country_issue = issues.iter().find(|i| i.issue_type == "MissingCountry").unwrap();
        assert_eq!(country_issue.confidence, 0.40);
        assert!(country_issue.suggested_value.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn no_city_column_skips_agent() {
        let mut row = Row::new(0);
        row.push("notes", Value::from_str_cell("hello"));
        let ds = Dataset::new(vec!["notes".into()], vec![row.clone()]);
        let profiles = analyze(&ds);
        let agent = GeographicEnrichmentAgent::default();
        let issues = agent.run(&[row], &profiles, None).await;
        assert!(issues.is_empty());
    }
}
