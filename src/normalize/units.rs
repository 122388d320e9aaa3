//! Unit parsing and conversion: free-text measurements -> `(value, unit,
//! confidence)`, and lossless conversion between same-dimension units.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FT_IN_EXPLICIT: Regex =
        Regex::new(r#"(?i)^(\d+\.?\d*)\s*(?:ft|feet|')\s*(\d+\.?\d*)\s*(?:in|inch(?:es)?|\")?$"#).unwrap();
    static ref FT_IN_WORDS: Regex =
        Regex::new(r"(?i)^(\d+\.?\d*)\s*feet\s*(\d+\.?\d*)\s*inches?$").unwrap();
    static ref IMPLIED_FT_IN: Regex = Regex::new(r"^(\d)\s+(\d{1,2})$").unwrap();
    static ref SINGLETON: Regex = Regex::new(
        r"(?i)^(\d+\.?\d*)\s*(centimeters?|meters?|inches|feet|kilograms?|grams?|pounds?|ounces?|cm|m|in|ft|kg|g|lb|oz)$"
    )
    .unwrap();
}

/// Parses a free-text measurement. Compound ft/in forms are always
/// converted to centimeters since there is no single symbol for "feet and
/// inches". Singleton units are returned as-is.
pub fn parse_units(value: &str) -> Option<(f64, String, f64)> {
    let trimmed = value.trim();

    if let Some(caps) = FT_IN_EXPLICIT.captures(trimmed).or_else(|| FT_IN_WORDS.captures(trimmed)) {
        let feet: f64 = caps[1].parse().ok()?;
        let inches: f64 = caps[2].parse().ok()?;
        let cm = (feet * 12.0 + inches) * 2.54;
        return Some((cm, "cm".to_string(), 0.9));
    }

    if let Some(caps) = IMPLIED_FT_IN.captures(trimmed) {
        let feet: f64 = caps[1].parse().ok()?;
        let inches: f64 = caps[2].parse().ok()?;
        if (3.0..=8.0).contains(&feet) && (0.0..=11.0).contains(&inches) {
            let cm = (feet * 12.0 + inches) * 2.54;
            return Some((cm, "cm".to_string(), 0.75));
        }
        return None;
    }

    if let Some(caps) = SINGLETON.captures(trimmed) {
        let magnitude: f64 = caps[1].parse().ok()?;
        let unit = normalize_unit_symbol(&caps[2]);
        return Some((magnitude, unit, 0.85));
    }

    None
}

fn normalize_unit_symbol(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "centimeter" | "centimeters" | "cm" => "cm",
        "meter" | "meters" | "m" => "m",
        "inch" | "inches" | "in" => "in",
        "feet" | "foot" | "ft" => "ft",
        "kilogram" | "kilograms" | "kg" => "kg",
        "gram" | "grams" | "g" => "g",
        "pound" | "pounds" | "lb" => "lb",
        "ounce" | "ounces" | "oz" => "oz",
        other => other,
    }
    .to_string()
}

const LENGTH_TO_CM: &[(&str, f64)] = &[("cm", 1.0), ("m", 100.0), ("in", 2.54), ("ft", 30.48)];
const MASS_TO_KG: &[(&str, f64)] = &[("kg", 1.0), ("g", 0.001), ("lb", 0.453592), ("oz", 0.0283495)];

/// Lossless conversion via a base-unit table (length base cm, mass base
/// kg). Returns `None` when the units belong to different dimensions.
pub fn convert_units(value: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
    if let (Some(from_factor), Some(to_factor)) = (factor_in(LENGTH_TO_CM, from_unit), factor_in(LENGTH_TO_CM, to_unit)) {
        return Some(value * from_factor / to_factor);
    }
    if let (Some(from_factor), Some(to_factor)) = (factor_in(MASS_TO_KG, from_unit), factor_in(MASS_TO_KG, to_unit)) {
        return Some(value * from_factor / to_factor);
    }
    None
}

fn factor_in(table: &[(&str, f64)], unit: &str) -> Option<f64> {
    table.iter().find(|(u, _)| *u == unit).map(|(_, f)| *f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_ft_in() {
        let (cm, unit, conf) = parse_units("5ft 10in").unwrap();
        assert_eq!(unit, "cm");
        assert!((cm - 177.8).abs() < 0.01);
        assert_eq!(conf, 0.9);
    }

    #[test]
    fn parses_implied_ft_in_when_plausible() {
        let (cm, unit, conf) = parse_units("5 8").unwrap();
        assert_eq!(unit, "cm");
        assert!((cm - 172.72).abs() < 0.01);
        assert_eq!(conf, 0.75);
    }

    #[test]
    fn rejects_implausible_implied_form() {
        assert!(parse_units("99 99").is_none());
    }

    #[test]
    fn parses_singleton_unit() {
        let (value, unit, _) = parse_units("72 kg").unwrap();
        assert_eq!(value, 72.0);
        assert_eq!(unit, "kg");
    }

    #[test]
    fn converts_across_length_units() {
        let cm = convert_units(1.0, "ft", "cm").unwrap();
        assert!((cm - 30.48).abs() < 0.001);
    }

    #[test]
    fn refuses_cross_dimension_conversion() {
        assert!(convert_units(1.0, "kg", "cm").is_none());
    }
}
