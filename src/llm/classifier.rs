//! Classifies LLM call failures into a small taxonomy so the gateway knows
//! whether a model should be retried, permanently abandoned, or treated as
//! momentarily out of quota.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmFailureClass {
    /// Model doesn't exist / was retired / access denied. Never retry.
    Permanent,
    /// Rate-limited or quota exhausted. Retry later, try another model now.
    QuotaExhausted,
    /// Network blip, timeout, 5xx. Worth retrying the same model.
    Transient,
}

impl fmt::Display for LlmFailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmFailureClass::Permanent => write!(f, "Permanent"),
            LlmFailureClass::QuotaExhausted => write!(f, "QuotaExhausted"),
            LlmFailureClass::Transient => write!(f, "Transient"),
        }
    }
}

pub struct FailureClassifier;

impl FailureClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, status: Option<u16>, message: &str) -> LlmFailureClass {
        let lower = message.to_lowercase();

        if matches!(status, Some(404)) || lower.contains("model not found") || lower.contains("not supported") {
            return LlmFailureClass::Permanent;
        }

        if matches!(status, Some(429))
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
            || lower.contains("rate_limit")
        {
            return LlmFailureClass::QuotaExhausted;
        }

        LlmFailureClass::Transient
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_404_as_permanent() {
        let classifier = FailureClassifier::new();
        assert_eq!(classifier.classify(Some(404), "model not found"), LlmFailureClass::Permanent);
    }

    #[test]
    fn classifies_429_as_quota_exhausted() {
        let classifier = FailureClassifier::new();
        assert_eq!(
            classifier.classify(Some(429), "Too many requests"),
            LlmFailureClass::QuotaExhausted
        );
    }

    #[test]
    fn classifies_resource_exhausted_message_without_status() {
        let classifier = FailureClassifier::new();
        assert_eq!(
            classifier.classify(None, "RESOURCE_EXHAUSTED: quota exceeded for this project"),
            LlmFailureClass::QuotaExhausted
        );
    }

    #[test]
    fn classifies_rate_limit_underscore_message_as_quota_exhausted() {
        let classifier = FailureClassifier::new();
        assert_eq!(
            classifier.classify(None, "error: rate_limit exceeded, slow down"),
            LlmFailureClass::QuotaExhausted
        );
    }

    #[test]
    fn defaults_unrecognized_errors_to_transient() {
        let classifier = FailureClassifier::new();
        assert_eq!(classifier.classify(Some(503), "service unavailable"), LlmFailureClass::Transient);
    }
}
