//! Configuration (C8): a typed `Config` loaded in layers, each one
//! overriding the last — built-in defaults, then `.env`, then process
//! environment variables, then CLI flags.

use crate::llm::Provider;

/// Generic webmail/consumer domains excluded when inferring a "company
/// domain" from an email address (CompanyValidation treats these as
/// uninformative).
pub const GENERIC_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "icloud.com",
    "mail.com",
    "protonmail.com",
    "aol.com",
    "live.com",
    "msn.com",
    "ymail.com",
    "gmx.com",
    "zoho.com",
    "fastmail.com",
];

/// Column-name keywords the Applier refuses to rewrite even when a detector
/// produced a suggestion for them.
pub const PROTECTED_PERSONAL_NAME_KEYWORDS: &[&str] = &[
    "firstname",
    "first_name",
    "lastname",
    "last_name",
    "fullname",
    "full_name",
    "username",
    "user_name",
    "name",
    "person",
    "customer",
    "employee",
    "contact",
];

pub const PROTECTED_GEOGRAPHIC_KEYWORDS: &[&str] = &["city", "town", "location", "place"];

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_provider: Provider,
    pub llm_api_key: String,
    pub llm_primary_model: Option<String>,
    pub request_timeout_seconds: u64,
    pub max_quota_exhausted_before_cascade_cap: usize,
    pub orchestration_deadline_seconds: u64,
    pub fuzzy_match_threshold: f64,
    pub categorical_similarity_threshold: f64,
    pub log_level: String,
    pub imputation_columns: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: Provider::Gemini,
            llm_api_key: "dummy-api-key".to_string(),
            llm_primary_model: None,
            request_timeout_seconds: 30,
            max_quota_exhausted_before_cascade_cap: 10,
            orchestration_deadline_seconds: 300,
            fuzzy_match_threshold: 0.6,
            categorical_similarity_threshold: 0.6,
            log_level: "info".to_string(),
            imputation_columns: None,
        }
    }
}

/// CLI-sourced overrides. `None` means "not passed on the command line,
/// fall through to env/defaults".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub llm_provider: Option<Provider>,
    pub llm_api_key: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    /// Loads defaults, applies `.env` (best-effort — a missing file is not
    /// an error), applies process environment variables, then applies CLI
    /// overrides, which always win.
    pub fn load(overrides: ConfigOverrides) -> Self {
        let _ = dotenv::dotenv();
        let mut config = Config::default();

        if let Ok(provider) = std::env::var("DQ_LLM_PROVIDER") {
            if let Some(p) = parse_provider(&provider) {
                config.llm_provider = p;
            }
        }
        if let Ok(key) = std::env::var("DQ_LLM_API_KEY") {
            config.llm_api_key = key;
        } else if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.llm_api_key = key;
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm_api_key = key;
        } else if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.llm_api_key = key;
        }
        if let Ok(model) = std::env::var("DQ_LLM_MODEL") {
            config.llm_primary_model = Some(model);
        }
        if let Ok(level) = std::env::var("DQ_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(seconds) = std::env::var("DQ_ORCHESTRATION_DEADLINE_SECONDS") {
            if let Ok(parsed) = seconds.parse() {
                config.orchestration_deadline_seconds = parsed;
            }
        }

        if let Some(provider) = overrides.llm_provider {
            config.llm_provider = provider;
        }
        if let Some(key) = overrides.llm_api_key {
            config.llm_api_key = key;
        }
        if let Some(level) = overrides.log_level {
            config.log_level = level;
        }

        config
    }
}

fn parse_provider(raw: &str) -> Option<Provider> {
    match raw.to_lowercase().as_str() {
        "openai" => Some(Provider::OpenAi),
        "gemini" => Some(Provider::Gemini),
        "claude" | "anthropic" => Some(Provider::Claude),
        _ => None,
    }
}
