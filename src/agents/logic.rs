//! Logic: cross-field conflicts and temporal paradoxes. Job start dates
//! before a birth date, end dates before start dates, and city/state
//! combinations the LLM considers geographically inconsistent.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use crate::normalize::date::parse_date;
use async_trait::async_trait;
use std::sync::Arc;

const CATEGORY: &str = "Logic";

fn date_columns(profiles: &ColumnAnalysis) -> Vec<String> {
    profiles.date_columns().into_iter().map(|s| s.to_string()).collect()
}

fn find_by_keywords(columns: &[String], include: &[&str], exclude: &[&str]) -> Option<String> {
    columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            include.iter().any(|kw| lower.contains(kw)) && !exclude.iter().any(|kw| lower.contains(kw))
        })
        .cloned()
}

async fn llm_identify_date_roles(date_columns: &[String], rows: &[Row], llm: &Arc<dyn LlmGateway>) -> (Option<String>, Option<String>) {
    let sample: serde_json::Map<String, serde_json::Value> = date_columns
        .iter()
        .map(|c| {
            let values: Vec<String> = rows
                .iter()
                .take(5)
                .filter_map(|r| r.get(c))
                .filter(|v| !v.is_missing())
                .map(|v| v.to_display_string())
                .collect();
            (c.clone(), serde_json::Value::from(values))
        })
        .collect();

    let prompt = format!(
        "Analyze these date columns and identify which ones are likely:\n- Birth date / Date of birth\n\
        - Job start date / Hire date / Employment start date\n\nDate columns: {}\nSample data: {}\n\n\
        Return ONLY a JSON object: {{\"birth_date_column\": \"column_name or null\", \"job_start_column\": \"column_name or null\"}}.",
        date_columns.join(", "),
        serde_json::Value::Object(sample)
    );
    let cancel = CancellationToken::new();
    let Ok(response) = llm.complete(&prompt, &cancel).await else { return (None, None) };
    let Some(json_text) = extract_json(&response) else { return (None, None) };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&json_text) else { return (None, None) };
    let birth = parsed.get("birth_date_column").and_then(|v| v.as_str()).map(|s| s.to_string());
    let job_start = parsed.get("job_start_column").and_then(|v| v.as_str()).map(|s| s.to_string());
    (birth, job_start)
}

async fn llm_validate_location(city: &str, state: &str, llm: &Arc<dyn LlmGateway>) -> bool {
    let prompt = format!(
        "Is this city/state combination valid? City: {city}, State: {state}\n\n\
        Return ONLY a JSON object with: {{\"valid\": true/false, \"explanation\": \"brief explanation\"}}."
    );
    let cancel = CancellationToken::new();
    let Ok(response) = llm.complete(&prompt, &cancel).await else { return true };
    let Some(json_text) = extract_json(&response) else { return true };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&json_text) else { return true };
    parsed.get("valid").and_then(|v| v.as_bool()).unwrap_or(true)
}

async fn llm_find_state_from_city(city: &str, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let prompt = format!(
        "What state/province is the city \"{city}\" located in? Use your geographic knowledge. \
        Return the full official name. Return ONLY JSON: {{\"state\": \"State Name\", \"confidence\": 0.0}}. \
        If unsure, return {{\"state\": null, \"confidence\": 0.0}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    parsed.get("state")?.as_str().map(|s| s.to_string())
}

pub struct LogicAgent;

#[async_trait]
impl Detector for LogicAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        if rows.is_empty() {
            return issues;
        }

        let date_columns = date_columns(profiles);

        let (mut birth_col, mut job_start_col) = (None, None);
        if let Some(gateway) = llm {
            if date_columns.len() >= 2 {
                let (b, j) = llm_identify_date_roles(&date_columns, rows, gateway).await;
                // The model is only allowed to name columns that actually
                // exist in this dataset; a hallucinated name falls through
                // to the keyword fallback below instead of sticking around
                // as a dead column reference.
                birth_col = b.filter(|c| date_columns.contains(c));
                job_start_col = j.filter(|c| date_columns.contains(c));
            }
        }
        if birth_col.is_none() || job_start_col.is_none() {
            if birth_col.is_none() {
                birth_col = find_by_keywords(&date_columns, &["birth", "dob"], &[]);
            }
            if job_start_col.is_none() {
                job_start_col = find_by_keywords(&date_columns, &["job", "start", "hire"], &["birth"]);
            }
        }

        // Resolve start/end (and created/updated) roles by column-name
        // semantics once, rather than relying on `date_columns`'s
        // (alphabetical) iteration order to imply which side is earlier.
        let role_pairs: Vec<(String, String)> = [(&["start"][..], &["end"][..]), (&["created"][..], &["updated"][..])]
            .iter()
            .filter_map(|(start_kw, end_kw)| {
                let start_c = find_by_keywords(&date_columns, start_kw, &[]);
                let end_c = find_by_keywords(&date_columns, end_kw, &[]);
                match (start_c, end_c) {
                    (Some(s), Some(e)) if s != e => Some((s, e)),
                    _ => None,
                }
            })
            .collect();

        let city_col = profiles.profiles().keys().find(|c| c.to_lowercase().contains("city")).cloned();
        let state_col = profiles
            .profiles()
            .keys()
            .find(|c| {
                let lower = c.to_lowercase();
                lower.contains("state") || lower.contains("province")
            })
            .cloned();

        for row in rows {
            if let (Some(birth_col), Some(job_start_col)) = (&birth_col, &job_start_col) {
                let birth_value = row.get(birth_col).map(|v| v.to_display_string());
                let job_value = row.get(job_start_col).map(|v| v.to_display_string());
                if let (Some(birth_raw), Some(job_raw)) = (birth_value, job_value) {
                    if let (Some((birth_iso, _)), Some((job_iso, _))) = (parse_date(&birth_raw), parse_date(&job_raw)) {
                        if job_iso < birth_iso {
                            issues.push(make_issue(
                                CATEGORY,
                                Some(row.id),
                                job_start_col,
                                "TemporalParadox",
                                job_raw.clone(),
                                None,
                                0.95,
                                format!("Job start date ({job_iso}) is before birth date ({birth_iso}). This is impossible."),
                                "Detects logical impossibilities: a job cannot start before birth.",
                            ));
                        }
                    }
                }
            }

            for (start_col, end_col) in &role_pairs {
                if let (Some(b), Some(j)) = (&birth_col, &job_start_col) {
                    if (start_col == b || start_col == j) && (end_col == b || end_col == j) {
                        continue;
                    }
                }

                let start_raw = row.get(start_col).map(|v| v.to_display_string());
                let end_raw = row.get(end_col).map(|v| v.to_display_string());
                let (Some(start_raw), Some(end_raw)) = (start_raw, end_raw) else { continue };
                let (Some((start_iso, _)), Some((end_iso, _))) = (parse_date(&start_raw), parse_date(&end_raw)) else { continue };

                if start_iso > end_iso {
                    issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        start_col,
                        "TemporalParadox",
                        format!("{start_col}: {start_iso}, {end_col}: {end_iso}"),
                        None,
                        0.9,
                        format!("Temporal inconsistency: {start_col} ({start_iso}) is after {end_col} ({end_iso})"),
                        "Detects logical impossibilities between date columns.",
                    ));
                }
            }

            if let (Some(city_col), Some(state_col), Some(gateway)) = (&city_col, &state_col, llm) {
                let city = row.get(city_col).map(|v| v.to_display_string()).filter(|s| !s.trim().is_empty());
                let state = row.get(state_col).map(|v| v.to_display_string()).filter(|s| !s.trim().is_empty());
                if let (Some(city), Some(state)) = (city, state) {
                    if !llm_validate_location(&city, &state, gateway).await {
                        let correct_state = llm_find_state_from_city(&city, gateway).await;
                        let (confidence, suggested) = match &correct_state {
                            Some(s) => (0.85, s.clone()),
                            None => (0.60, format!("[AI failed - verify state for {city}]")),
                        };
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            state_col,
                            "CrossFieldConflict",
                            state.clone(),
                            Some(suggested.clone()),
                            confidence,
                            format!("Geographic inconsistency: {city} is not in {state}. Correct state should be '{suggested}'"),
                            "Uses the LLM to determine the correct state for a city, then flags the mismatch.",
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
    use crate::llm::StubGateway;
    use crate::model::{Dataset, Value};

    fn row_with(id: usize, cols: &[(&str, &str)]) -> Row {
        let mut row = Row::new(id);
        for (c, v) in cols {
            row.push(*c, Value::from_str_cell(v));
        }
        row
    }

    #[tokio::test]
    async fn flags_job_start_before_birth_date() {
        let rows = vec![
            row_with(0, &[("date_of_birth", "2000-01-01"), ("job_start_date", "1995-01-01")]),
            row_with(1, &[("date_of_birth", "1990-01-01"), ("job_start_date", "2015-01-01")]),
        ];
        let ds = Dataset::new(vec!["date_of_birth".into(), "job_start_date".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = LogicAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.iter().any(|i| i.row_id == Some(0) && i.issue_type == "TemporalParadox"));
        assert!(!issues.iter().any(|i| i.row_id == Some(1)));
    }

    #[tokio::test]
    async fn flags_end_date_before_start_date() {
        let rows = vec![row_with(0, &[("start_date", "2022-05-01"), ("end_date", "2022-01-01")])];
        let ds = Dataset::new(vec!["start_date".into(), "end_date".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = LogicAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.iter().any(|i| i.issue_type == "TemporalParadox"));
    }

    #[tokio::test]
    async fn hallucinated_birth_date_column_falls_back_to_keyword_match() {
        // The model names a column ("dob_field") that doesn't exist in this
        // dataset; birth_col must fall back to the real "date_of_birth"
        // column instead of sticking with the dead reference.
        let rows = vec![
            row_with(0, &[("date_of_birth", "2000-01-01"), ("job_start_date", "1995-01-01")]),
            row_with(1, &[("date_of_birth", "1990-01-01"), ("job_start_date", "2015-01-01")]),
        ];
        let ds = Dataset::new(vec!["date_of_birth".into(), "job_start_date".into()], rows.clone());
        let profiles = analyze(&ds);
        let gateway: Arc<dyn LlmGateway> = Arc::new(StubGateway::new().with_response(
            "birth_date_column",
            r#"{"birth_date_column": "dob_field", "job_start_column": null}"#,
        ));
        let agent = LogicAgent;
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;
        assert!(issues.iter().any(|i| i.row_id == Some(0) && i.issue_type == "TemporalParadox"));
    }

    #[tokio::test]
    async fn flags_city_state_mismatch_via_llm() {
        let rows = vec![row_with(0, &[("city", "Mumbai"), ("state", "Gujarat")])];
        let ds = Dataset::new(vec!["city".into(), "state".into()], rows.clone());
        let profiles = analyze(&ds);
        let gateway: Arc<dyn LlmGateway> = Arc::new(
            StubGateway::new()
                .with_response("valid", r#"{"valid": false, "explanation": "Mumbai is in Maharashtra"}"#)
                .with_response("state/province", r#"{"state": "Maharashtra", "confidence": 0.9}"#),
        );
        let agent = LogicAgent;
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;
        assert!(issues.iter().any(|i| i.issue_type == "CrossFieldConflict" && i.suggested_value.as_deref() == Some("Maharashtra")));
    }
}
