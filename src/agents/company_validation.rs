//! CompanyValidation: two passes. Pass 1 cross-checks a row's company name
//! against the company its email domain resolves to via the LLM (generic
//! webmail domains carry no company signal and are excluded). Pass 2
//! standardizes the remaining company-name variations onto a single
//! canonical spelling.

use super::{make_issue, Detector};
use crate::analyzer::ColumnAnalysis;
use crate::config::GENERIC_EMAIL_DOMAINS;
use crate::llm::{extract_json, LlmGateway};
use crate::model::{CancellationToken, InferredType, Issue, Row};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CATEGORY: &str = "CompanyValidation";

const COMPANY_KEYWORDS: [&str; 8] = ["company", "organisation", "organization", "org", "corp", "firm", "employer", "business"];

/// Measurement/location/date/contact column names that `by_shape`'s
/// low-cardinality-text heuristic would otherwise misfire on.
const COMPANY_REJECT_KEYWORDS: [&str; 16] = [
    "height", "weight", "length", "width", "distance", "amount", "date", "time", "city", "state", "country", "province", "phone",
    "email", "mail", "address",
];

fn find_company_columns(profiles: &ColumnAnalysis, row_count: usize) -> Vec<String> {
    profiles
        .profiles()
        .values()
        .filter(|p| {
            let lower = p.name.to_lowercase();
            if COMPANY_REJECT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return false;
            }
            let by_name = COMPANY_KEYWORDS.iter().any(|kw| lower.contains(kw));
            let by_shape = p.inferred_type == InferredType::Text
                && p.unique_count > 10
                && (p.unique_count as f64) < row_count as f64 * 0.8;
            by_name || by_shape
        })
        .map(|p| p.name.clone())
        .collect()
}

async fn find_canonical_name(names: &[String], llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let joined = names.iter().map(|n| format!("\"{n}\"")).collect::<Vec<_>>().join(", ");
    let prompt = format!(
        "Given these company name variations: [{joined}]\n\nWhich is the CANONICAL, full, official company name? \
        Prefer full names over abbreviations. Return ONLY JSON: {{\"canonical_name\": \"...\"}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let canonical = parsed.get("canonical_name")?.as_str()?.to_string();
    names.iter().find(|n| **n == canonical).cloned()
}

struct ValidationResult {
    is_valid: bool,
    corrected_name: Option<String>,
    confidence: f64,
    explanation: String,
}

async fn validate_company(name: &str, canonical: Option<&str>, llm: &Arc<dyn LlmGateway>) -> Option<ValidationResult> {
    let context = canonical
        .map(|c| format!("\n\nThe canonical company name in this dataset is '{c}'. Standardize variations to it."))
        .unwrap_or_default();
    let prompt = format!(
        "Analyze this company name: \"{name}\"{context}\n\nCheck for typos, abbreviations, or known variations and \
        prefer full names over abbreviations (e.g. \"TCS\" -> \"Tata Consultancy Services\"). Return ONLY JSON: \
        {{\"is_valid\": true, \"corrected_name\": null, \"confidence\": 0.9, \"explanation\": \"...\"}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    Some(ValidationResult {
        is_valid: parsed.get("is_valid").and_then(|v| v.as_bool()).unwrap_or(true),
        corrected_name: parsed.get("corrected_name").and_then(|v| v.as_str()).map(|s| s.to_string()),
        confidence: parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.75),
        explanation: parsed
            .get("explanation")
            .and_then(|v| v.as_str())
            .unwrap_or("Standardized company name.")
            .to_string(),
    })
}

/// Splits a non-generic email into `(domain, domain_root)`, or `None` when
/// the address has no domain or the domain carries no company signal.
fn non_generic_domain(email: &str) -> Option<(String, String)> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.to_lowercase();
    if domain.is_empty() || GENERIC_EMAIL_DOMAINS.contains(&domain.as_str()) {
        return None;
    }
    let root = domain.split('.').next()?.to_string();
    Some((domain, root))
}

async fn infer_company_from_domain(domain: &str, llm: &Arc<dyn LlmGateway>) -> Option<String> {
    let prompt = format!(
        "What company most likely owns the email domain \"{domain}\"? Use your knowledge of real companies. \
        Return ONLY JSON: {{\"company\": \"Official Company Name\"}}. If unsure, return {{\"company\": null}}."
    );
    let cancel = CancellationToken::new();
    let response = llm.complete(&prompt, &cancel).await.ok()?;
    let json_text = extract_json(&response)?;
    let parsed: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    parsed.get("company")?.as_str().map(|s| s.to_string())
}

pub struct CompanyValidationAgent {
    cache: DashMap<String, (bool, Option<String>, f64, String)>,
    domain_cache: DashMap<String, Option<String>>,
}

impl Default for CompanyValidationAgent {
    fn default() -> Self {
        Self { cache: DashMap::new(), domain_cache: DashMap::new() }
    }
}

#[async_trait]
impl Detector for CompanyValidationAgent {
    fn name(&self) -> &'static str {
        CATEGORY
    }

    async fn run(&self, rows: &[Row], profiles: &ColumnAnalysis, llm: Option<&Arc<dyn LlmGateway>>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let company_columns = find_company_columns(profiles, rows.len());
        if company_columns.is_empty() {
            return issues;
        }

        let email_column = profiles.profiles().values().find(|p| p.inferred_type == InferredType::Email).map(|p| p.name.clone());

        // Pass 1: cross-check the recorded company against the company the
        // email's domain resolves to (LLM-backed). Rows whose email is in
        // the generic webmail list carry no company signal and are excluded
        // from this pass and from Pass 2's canonicalization below.
        let mut generic_email_rows: HashSet<usize> = HashSet::new();
        if let Some(email_column) = &email_column {
            for row in rows {
                let Some(email_value) = row.get(email_column) else { continue };
                let email = email_value.to_display_string();
                let Some((domain, domain_root)) = non_generic_domain(&email) else {
                    if email.contains('@') {
                        generic_email_rows.insert(row.id);
                    }
                    continue;
                };

                let Some(gateway) = llm else { continue };
                let cached = self.domain_cache.get(&domain).map(|v| v.clone());
                let inferred_company = match cached {
                    Some(v) => v,
                    None => {
                        let found = infer_company_from_domain(&domain, gateway).await;
                        self.domain_cache.insert(domain.clone(), found.clone());
                        found
                    }
                };
                let Some(inferred_company) = inferred_company else { continue };

                for column in &company_columns {
                    let Some(value) = row.get(column) else { continue };
                    let company = value.to_display_string().trim().to_string();
                    if company.is_empty() || company.eq_ignore_ascii_case(&inferred_company) {
                        continue;
                    }
                    issues.push(make_issue(
                        CATEGORY,
                        Some(row.id),
                        column,
                        "CompanyMismatch",
                        company.clone(),
                        Some(inferred_company.clone()),
                        0.95,
                        format!(
                            "Email domain '{domain_root}' resolves to '{inferred_company}', which does not match the recorded company '{company}'."
                        ),
                        "Cross-checks the recorded company against the company the email's domain resolves to via the LLM.",
                    ));
                }
            }
        }

        // Pass 2: canonicalize company-name variants, excluding rows whose
        // email carried no company signal.
        let mut locations: HashMap<String, Vec<(usize, String)>> = HashMap::new();
        for row in rows {
            if generic_email_rows.contains(&row.id) {
                continue;
            }
            for column in &company_columns {
                let Some(value) = row.get(column) else { continue };
                let name = value.to_display_string().trim().to_string();
                if name.is_empty() {
                    continue;
                }
                locations.entry(name).or_default().push((row.id, column.clone()));
            }
        }

        let canonical = if locations.len() > 1 {
            let names: Vec<String> = locations.keys().cloned().collect();
            match llm {
                Some(gateway) => find_canonical_name(&names, gateway).await.or_else(|| {
                    names.iter().max_by_key(|n| (n.len(), locations[*n].len())).cloned()
                }),
                None => names.iter().max_by_key(|n| (n.len(), locations[*n].len())).cloned(),
            }
        } else {
            None
        };

        for (company, locs) in &locations {
            if Some(company.as_str()) == canonical.as_deref() {
                continue;
            }

            let cached = self.cache.get(company).map(|v| v.clone());
            let validation = match (cached, llm) {
                (Some(v), _) => Some(v),
                (None, Some(gateway)) => {
                    let result = validate_company(company, canonical.as_deref(), gateway).await;
                    result.map(|v| {
                        let tuple = (v.is_valid, v.corrected_name, v.confidence, v.explanation);
                        self.cache.insert(company.clone(), tuple.clone());
                        tuple
                    })
                }
                (None, None) => None,
            };

            let (should_create, suggested, confidence, explanation) = match validation {
                Some((is_valid, corrected, confidence, explanation)) if !is_valid => {
                    (true, corrected.or_else(|| canonical.clone()).unwrap_or_else(|| company.clone()), confidence, explanation)
                }
                Some((_, Some(corrected), confidence, explanation)) if corrected != *company => (true, corrected, confidence, explanation),
                None if canonical.is_some() => (
                    true,
                    canonical.clone().unwrap(),
                    0.7,
                    format!("Multiple company name variations detected. Standardizing to most common: {}", canonical.clone().unwrap()),
                ),
                _ => (false, company.clone(), 0.0, String::new()),
            };

            if should_create && suggested != *company {
                for (row_id, column) in locs {
                    issues.push(make_issue(
                        CATEGORY,
                        Some(*row_id),
                        column,
                        "CompanyValidation",
                        company.clone(),
                        Some(suggested.clone()),
                        confidence,
                        explanation.clone(),
                        "Identifies company-name variations across the dataset and standardizes them to a single canonical spelling.",
                    ));
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

    fn row(id: usize, company: &str) -> Row {
        let mut r = Row::new(id);
        r.push("company", Value::from_str_cell(company));
        r
    }

    fn row_with_email(id: usize, company: &str, email: &str) -> Row {
        let mut r = Row::new(id);
        r.push("company", Value::from_str_cell(company));
        r.push("email", Value::from_str_cell(email));
        r
    }

    #[tokio::test]
    async fn standardizes_to_longest_most_frequent_name_without_llm() {
        let rows: Vec<Row> = (0..12)
            .map(|i| row(i, if i < 9 { "Microsoft Corporation" } else { "MS" }))
            .collect();
        let ds = Dataset::new(vec!["company".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = CompanyValidationAgent::default();
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.iter().any(|i| i.dirty_value == "MS" && i.suggested_value.as_deref() == Some("Microsoft Corporation")));
    }

    #[tokio::test]
    async fn single_company_name_produces_no_issue() {
        let rows: Vec<Row> = (0..12).map(|i| row(i, "Infosys")).collect();
        let ds = Dataset::new(vec!["company".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = CompanyValidationAgent::default();
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn generic_email_rows_are_excluded_from_canonicalization() {
        let rows = vec![
            row_with_email(0, "MS", "alice@gmail.com"),
            row_with_email(1, "Microsoft", "bob@corp.io"),
            row_with_email(2, "Microsoft", "carol@corp.io"),
        ];
        let ds = Dataset::new(vec!["company".into(), "email".into()], rows.clone());
        let profiles = analyze(&ds);
        let agent = CompanyValidationAgent::default();
        let issues = agent.run(&rows, &profiles, None).await;
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn flags_company_mismatch_against_email_domain_via_llm() {
        let rows = vec![row_with_email(0, "Acme Inc", "alice@techcorp.io")];
        let ds = Dataset::new(vec!["company".into(), "email".into()], rows.clone());
        let profiles = analyze(&ds);
        let gateway: Arc<dyn LlmGateway> = Arc::new(StubGateway::new().with_response("company", r#"{"company": "TechCorp"}"#));
        let agent = CompanyValidationAgent::default();
        let issues = agent.run(&rows, &profiles, Some(&gateway)).await;
        let issue = issues.iter().find(|i| i.issue_type == "CompanyMismatch").expect("missing CompanyMismatch");
        assert_eq!(issue.suggested_value.as_deref(), Some("TechCorp"));
        assert_eq!(issue.confidence, 0.95);
    }
}
