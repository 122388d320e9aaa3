//! Extraction: pulls structured fields (emails, URLs) out of long free-text
//! columns via regex, falling back to the LLM for anything a pattern can't
//! find. Never touches columns that already look structured.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, Issue, Row};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

const CATEGORY: &str = "Extraction";

lazy_static! {
    static ref EMAIL_IN_TEXT: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref URL_IN_TEXT: Regex = Regex::new(r"https?://\S+").unwrap();
}

/// Columns excluded because they're already structured (email, phone, url,
/// name, id), plus any column whose sampled values include a string longer
/// than 20 characters — a loose proxy for "contains free text".
fn text_columns(profiles: &ColumnAnalysis) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| {
            let lower = p.name.to_lowercase();
            let already_structured = ["email", "phone", "url", "name", "id"].iter().any(|kw| lower.contains(kw));
            !already_structured && p.sample_values.iter().any(|v| v.len() > 20)
        })
        .map(|p| p.name.clone())
        .collect()
}

fn truncate(value: &str) -> String {
    if value.chars().count() > 50 {
        let head: String = value.chars().take(50).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

async fn llm_extract_metadata(text: &str, llm: &Arc<dyn LlmGateway>) -> Vec<(String, String)> {
    let snippet: String = text.chars().take(200).collect();
    let prompt = format!(
        "Extract structured data from this text: \"{snippet}\"\n\n\
        Return ONLY a JSON object with any of: email, name, phone, url\n\
        {{\"email\": \"extracted_email_or_null\", \"name\": \"extracted_name_or_null\", \
        \"phone\": \"extracted_phone_or_null\", \"url\": \"extracted_url_or_null\"}}."
    );
    let cancel = CancellationToken::new();
    let Ok(response) = llm.complete(&prompt, &cancel).await else { return Vec::new() };
    let Some(json_text) = extract_json(&response) else { return Vec::new() };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&json_text) else { return Vec::new() };
    let Some(object) = parsed.as_object() else { return Vec::new() };
    object
        .iter()
        .filter_map(|(field, value)| {
            let value = value.as_str()?;
            if value.is_empty() || value.eq_ignore_ascii_case("null") {
                None
            } else {
                Some((field.clone(), value.to_string()))
            }
        })
        .collect()
}

pub struct ExtractionAgent;

#[async_trait]
impl Detector for ExtractionAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let columns = text_columns(profiles);
        if columns.is_empty() {
            return issues;
        }

        let has_email_column = profiles.profiles().keys().any(|c| c.to_lowercase().contains("email"));
        let has_url_column = profiles.profiles().keys().any(|c| c.to_lowercase().contains("url"));

        for row in rows {
            for column in &columns {
                let Some(value) = row.get(column) else { continue };
                if value.is_missing() {
                    continue;
                }
                let text = value.to_display_string();
                if text.len() <= 10 {
                    continue;
                }

                let mut extracted: Vec<(&str, String)> = Vec::new();
                if !has_email_column {
                    if let Some(m) = EMAIL_IN_TEXT.find(&text) {
                        extracted.push(("email", m.as_str().to_string()));
                    }
                }
                if !has_url_column {
                    if let Some(m) = URL_IN_TEXT.find(&text) {
                        extracted.push(("url", m.as_str().to_string()));
                    }
                }

                if !extracted.is_empty() {
                    for (field, found) in &extracted {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "MetadataScraping",
                            truncate(&text),
                            Some(format!("Extract {field}: {found}")),
                            0.9,
                            format!("Found {field} in text field: {found}"),
                            "Pulls structured data out of strings like emails or URLs.",
                        ));
                    }
                } else if let Some(gateway) = llm {
                    for (field, found) in llm_extract_metadata(&text, gateway).await {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "MetadataScraping",
                            truncate(&text),
                            Some(format!("Extract {field}: {found}")),
                            0.7,
                            format!("LLM extracted {field}: {found}"),
                            "Falls back to the LLM for structured data embedded in complex unstructured text.",
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

    fn row(id: usize, notes: &str) -> Row {
        let mut r = Row::new(id);
        r.push("notes", Value::from_str_cell(notes));
        r
    }

    #[tokio::test]
    async fn extracts_email_from_free_text_via_regex() {
        let rows = vec![row(0, "Reach out anytime at contact@example.com for a quote on this order")];
        let ds = Dataset::new(vec!["notes".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = ExtractionAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.iter().any(|i| i.suggested_value.as_deref() == Some("Extract email: contact@example.com")));
    }

    #[tokio::test]
    async fn short_text_columns_are_skipped() {
        let rows = vec![row(0, "short")];
        let ds = Dataset::new(vec!["notes".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = ExtractionAgent;
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_llm_when_no_pattern_matches() {
        let rows = vec![row(0, "Please call Priya Sharma about the shipment delay at the earliest")];
        let ds = Dataset::new(vec!["notes".into()], rows.clone());
        let profiles = analyze(&ds);
        let gateway: Arc<dyn LlmGateway> =
            Arc::new(StubGateway::new().with_response("Extract structured", r#"{"name": "Priya Sharma", "email": null}"#));
        let agent = ExtractionAgent;
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;
        assert!(issues.iter().any(|i| i.suggested_value.as_deref() == Some("Extract name: Priya Sharma")));
    }
}
