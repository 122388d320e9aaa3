//! Formatting: standardizes dates to ISO `YYYY-MM-DD` and phone numbers to
//! a country-specific canonical form. Country for phone normalization is
//! resolved in priority order: an explicit country column, then city/state
//! via the LLM, then the column's own dominant-pattern country hint.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::llm::LlmGateway;
use crate::model::{CancellationToken, InferredType, Issue, Row};
use crate::normalize::{date, phone};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

const CATEGORY: &str = "Formatting";

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

fn matching_columns(profiles: &ColumnAnalysis, keywords: &[&str], inferred: InferredType) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| p.inferred_type == inferred || keywords.iter().any(|kw| p.name.to_lowercase().contains(kw)))
        .map(|p| p.name.clone())
        .collect()
}

fn country_code_from_name(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if ["united states", "usa", "us", "united states of america", "u.s.", "u.s.a."].contains(&lower.as_str()) {
        return Some("US".to_string());
    }
    if ["india", "ind", "bharat", "in", "indian"].contains(&lower.as_str()) {
        return Some("IN".to_string());
    }
    if name.len() == 2 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(name.to_uppercase());
    }
    None
}

async fn infer_country_from_location(city: Option<&str>, state: Option<&str>, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let location = city.map(|c| format!("City: {c}")).or_else(|| state.map(|s| format!("State: {s}")))?;
    let prompt = format!(
        "Based on this location information: {location}\n\nReturn ONLY the 2-letter country code \
        (IN for Indian cities, US for US cities, GB for UK cities, etc.) with no other text."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let code = response.trim().to_uppercase();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code)
    } else {
        None
    }
}

async fn llm_normalize_date(value: &str, llm: &Arc<dyn LlmGateway>) -> Option<(String, f64)> {
    let prompt = format!(
        "Normalize this date string to ISO format (YYYY-MM-DD): \"{value}\"\n\n\
        Return ONLY JSON: {{\"normalized\": \"YYYY-MM-DD\", \"confidence\": 0.0}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = crate::llm::extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let normalized = parsed.get("normalized")?.as_str()?.to_string();
    let confidence = parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.7);
    Some((normalized, confidence))
}

pub struct FormattingAgent;

#[async_trait]
impl Detector for FormattingAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let date_columns = matching_columns(
            profiles,
            &["date", "time", "created", "updated", "timestamp", "dob", "birth", "start", "end"],
            InferredType::Date,
        );
        let phone_columns = matching_columns(profiles, &["phone", "tel", "mobile", "cell"], InferredType::Phone);
        let country_column = profiles.profiles().keys().find(|c| c.to_lowercase().contains("country")).cloned();
        let city_column = profiles.profiles().keys().find(|c| c.to_lowercase().contains("city")).cloned();
        let state_column = profiles.profiles().keys().find(|c| c.to_lowercase().contains("state")).cloned();

        let fallback_country_hint = phone_columns
            .first()
            .and_then(|c| profiles.get(c))
            .and_then(|p| p.country_hint.clone())
            .unwrap_or_else(|| "US".to_string());

        for row in rows {
            for column in &date_columns {
                let Some(value) = row.get(column) else { continue };
                let raw = value.to_display_string().trim().to_string();
                if raw.is_empty() || ISO_DATE.is_match(&raw) {
                    continue;
                }

                if let Some((iso, confidence)) = date::parse_date(&raw) {
                    issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        column,
                        "DateFormatting",
                        raw.clone(),
                        Some(iso.clone()),
                        confidence,
                        format!("Date standardization: '{raw}' -> '{iso}' (YYYY-MM-DD format)"),
                        "Parses common date formats deterministically before falling back to the LLM for ambiguous strings.",
                    ));
                } else if let Some(gateway) = llm {
                    if let Some((suggested, confidence)) = llm_normalize_date(&raw, gateway).await {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "DateFormatting",
                            raw.clone(),
                            Some(suggested.clone()),
                            confidence,
                            format!("Date standardization: '{raw}' -> '{suggested}' (YYYY-MM-DD format)"),
                            "Falls back to the LLM for dates no deterministic format recognizes.",
                        ));
                    }
                }
            }

            for column in &phone_columns {
                let Some(value) = row.get(column) else { continue };
                let raw = value.to_display_string().trim().to_string();
                if raw.is_empty() {
                    continue;
                }

                let country_value = country_column.as_ref().and_then(|c| row.get(c)).map(|v| v.to_display_string());
                let city_value = city_column.as_ref().and_then(|c| row.get(c)).map(|v| v.to_display_string());
                let state_value = state_column.as_ref().and_then(|c| row.get(c)).map(|v| v.to_display_string());

                let mut country_to_use = country_value.as_deref().and_then(country_code_from_name);

                if country_to_use.is_none() {
                    if raw.starts_with("+91") {
                        country_to_use = Some("IN".to_string());
                    } else if raw.starts_with("+1") {
                        country_to_use = Some("US".to_string());
                    }
                }

                if country_to_use.is_none() {
                    if let Some(gateway) = llm {
                        if city_value.is_some() || state_value.is_some() {
                            country_to_use = infer_country_from_location(city_value.as_deref(), state_value.as_deref(), gateway).await;
                        }
                    }
                }

                let country_to_use = country_to_use.unwrap_or_else(|| fallback_country_hint.clone());

                if let Some((normalized, confidence)) = phone::normalize_phone(&raw, Some(&country_to_use)) {
                    if normalized != raw {
                        issues.push(make_issue(
                            CATEGORY,
                            Some(row.id),
                            column,
                            "PhoneNormalization",
                            raw.clone(),
                            Some(normalized.clone()),
                            confidence,
                            format!("Phone number normalized to {country_to_use} format: {normalized}"),
                            "Resolves country by priority (country column, then city/state, then pattern hint) before formatting.",
                        ));
                    }
                }
            }
        }

        issues
    }
}
