//! EmailValidation: finds malformed email addresses and proposes a fix. An
//! address with no `@` at all always gets `@gmail.com` appended, regardless
//! of the dataset's dominant domain; the dominant domain is only used to
//! complete a domain that's merely missing its extension (e.g. `user@corp`).

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::config::GENERIC_EMAIL_DOMAINS;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, InferredType, Issue, Row};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

const CATEGORY: &str = "EmailValidation";
const DEFAULT_DOMAIN: &str = "gmail.com";

lazy_static! {
    static ref VALID_EMAIL: Regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

fn has_invalid_pattern(email: &str) -> bool {
    email.matches('@').count() > 1
        || email.contains("..")
        || email.starts_with('.')
        || email.ends_with('.')
        || email.contains("@.")
        || email.contains(".@")
        || email != email.trim()
}

fn problems_in(email: &str) -> Vec<&'static str> {
    let mut found = Vec::new();
    if !VALID_EMAIL.is_match(email) {
        found.push("Invalid email format");
    }
    if has_invalid_pattern(email) {
        found.push("Contains invalid characters/patterns");
    }
    let missing_at = !email.contains('@');
    if missing_at {
        found.push("Missing @ symbol");
    }
    let missing_domain = match email.rsplit_once('@') {
        Some((_, domain)) => !domain.contains('.'),
        None => true,
    };
    if missing_domain {
        found.push("Missing domain extension");
    }
    found
}

fn fallback_fix(email: &str, common_domain: Option<&str>) -> Option<String> {
    if !email.contains('@') {
        return Some(format!("{email}@{DEFAULT_DOMAIN}"));
    }
    if let Some((local, rest)) = email.rsplit_once('@') {
        if !rest.contains('.') {
            let domain = common_domain.unwrap_or(DEFAULT_DOMAIN);
            return Some(format!("{local}@{domain}"));
        }
    }
    None
}

async fn llm_fix(email: &str, llm: &Arc<dyn LlmGateway>, data_context: &str, common_domain: Option<&str>) -> Option<String> {
    let domain_hint = common_domain
        .map(|d| format!("\n\nThe most common email domain in this dataset is '{d}'. Prefer it over any default."))
        .unwrap_or_default();
    let prompt = format!(
        "Fix this invalid email address: \"{email}\"{domain_hint}\n\nColumn context: {data_context}\n\n\
        If the address is missing an @ or a domain, append the dataset's common domain (or {DEFAULT_DOMAIN} if none is known). \
        Return ONLY JSON: {{\"fixed\": \"corrected@example.com\", \"confidence\": 0.0, \"explanation\": \"...\"}}. \
        If it cannot be fixed, return {{\"fixed\": null, \"confidence\": 0.0, \"explanation\": \"...\"}}."
    );

    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let fixed = parsed.get("fixed")?.as_str()?.to_string();

    // A string with no @ at all gets gmail.com unless the model already
    // proposed another generic webmail domain; a corporate-sounding
    // guess is always overridden.
    if !email.contains('@') {
        let proposed_is_generic = fixed
            .rsplit_once('@')
            .map(|(_, domain)| GENERIC_EMAIL_DOMAINS.contains(&domain.to_lowercase().as_str()))
            .unwrap_or(false);
        if !proposed_is_generic {
            return Some(format!("{email}@{DEFAULT_DOMAIN}"));
        }
    }
    Some(fixed)
}

pub struct EmailValidationAgent;

#[async_trait]
impl Detector for EmailValidationAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let email_columns: Vec<String> = profiles
            .profiles()
            .values()
            .filter(|p| {
                let lower = p.name.to_lowercase();
                p.inferred_type == InferredType::Email || lower.contains("email") || lower.contains("e-mail") || lower.contains("mail")
            })
            .map(|p| p.name.clone())
            .collect();

        if email_columns.is_empty() {
            return issues;
        }

        let common_domain = email_columns
            .first()
            .and_then(|c| profiles.get(c))
            .and_then(|p| p.most_common_domain.clone());

        for row in rows {
            for column in &email_columns {
                let Some(value) = row.get(column) else { continue };
                let email = value.to_display_string().trim().to_string();
                if email.is_empty() {
                    continue;
                }

                let problems = problems_in(&email);
                if problems.is_empty() {
                    continue;
                }

                let suggested = if let Some(gateway) = llm {
                    let context = profiles.data_context(column);
                    llm_fix(&email, gateway, &context, common_domain.as_deref())
                        .await
                        .or_else(|| fallback_fix(&email, common_domain.as_deref()))
                } else {
                    fallback_fix(&email, common_domain.as_deref())
                };

                match suggested {
                    Some(fixed) if fixed != email => issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        column,
                        "InvalidEmail",
                        email.clone(),
                        Some(fixed.clone()),
                        0.85,
                        format!("Invalid email detected: {}. Suggested correction: {fixed}", problems.join(", ")),
                        "Uses the dataset's own dominant domain (falling back to gmail.com) to repair malformed addresses.",
                    )),
                    _ => issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        column,
                        "InvalidEmail",
                        email.clone(),
                        None,
                        0.7,
                        format!("Invalid email detected: {}. Cannot auto-fix.", problems.join(", ")),
                        "Flagged but left unfixed: no safe correction could be determined.",
                    )),
                }
            }
        }

        issues
    }
}
