//! Phone normalization: arbitrary punctuation -> a country-specific canonical
//! format. The `country_code` parameter, when supplied, has absolute
//! priority over any prefix found in the raw string or pattern-based
//! auto-detection.

/// Heuristically detects a phone's country from its digits alone, with no
/// other row context. Used only when neither a `country` column value nor a
/// `+` prefix is available.
pub fn detect_phone_country(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if raw.contains("+91") || (digits.starts_with("91") && digits.len() >= 12) {
        return "IN".to_string();
    }
    if digits.len() == 10 && matches!(digits.chars().next(), Some('6'..='9')) {
        return "IN".to_string();
    }
    if raw.contains("+1") || (digits.starts_with('1') && digits.len() == 11) {
        return "US".to_string();
    }
    "US".to_string()
}

/// Normalizes `raw` to a canonical phone string. Returns `(formatted,
/// confidence)`, or `None` when fewer than 7 significant digits remain.
pub fn normalize_phone(raw: &str, country_code: Option<&str>) -> Option<(String, f64)> {
    let has_plus = raw.trim_start().starts_with('+');
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let effective_code = match country_code {
        Some(code) if !code.trim().is_empty() => code.trim().to_uppercase(),
        _ => derive_code_from_prefix(raw, &digits).unwrap_or_else(|| detect_phone_country(raw)),
    };

    strip_country_prefix(&mut digits, &effective_code, has_plus);
    while digits.starts_with('0') && digits.len() > 10 {
        digits.remove(0);
    }

    if digits.len() < 7 {
        return None;
    }

    let take = digits.len().min(10);
    let phone_digits = &digits[digits.len() - take..];
    let confidence = confidence_for(phone_digits.len(), &effective_code);

    let formatted = match effective_code.as_str() {
        "IN" => format!("+91 {phone_digits}"),
        "US" if phone_digits.len() == 10 => format!(
            "+1 ({}) {}-{}",
            &phone_digits[0..3],
            &phone_digits[3..6],
            &phone_digits[6..10]
        ),
        "US" => format!("+1 {phone_digits}"),
        other => format!("+{other} {phone_digits}"),
    };

    Some((formatted, confidence))
}

fn derive_code_from_prefix(raw: &str, digits: &str) -> Option<String> {
    if raw.contains("+91") || (digits.starts_with("91") && digits.len() >= 12) {
        return Some("IN".to_string());
    }
    if raw.contains("+1") || (digits.starts_with('1') && digits.len() == 11) {
        return Some("US".to_string());
    }
    None
}

fn strip_country_prefix(digits: &mut String, code: &str, has_plus: bool) {
    match code {
        "IN" if digits.starts_with("91") && digits.len() > 10 => {
            *digits = digits[2..].to_string();
        }
        "US" if digits.starts_with('1') && digits.len() == 11 => {
            *digits = digits[1..].to_string();
        }
        _ if has_plus && digits.len() > 10 => {
            let overflow = digits.len() - 10;
            if overflow <= 3 {
                *digits = digits[overflow..].to_string();
            }
        }
        _ => {}
    }
}

fn confidence_for(digit_count: usize, code: &str) -> f64 {
    let is_named = matches!(code, "IN" | "US");
    match digit_count {
        10 if is_named => 0.9,
        10 => 0.7,
        8..=9 if is_named => 0.8,
        8..=9 => 0.6,
        _ if is_named => 0.7,
        _ => 0.6,
    }
}
