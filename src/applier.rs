//! Applier (C6): materializes selected Issues into a repaired row set plus
//! a `ChangeMap`, under three modes — preview (in-memory), export, and
//! commit (both write through the Artifact Sink).

use crate::config::{PROTECTED_GEOGRAPHIC_KEYWORDS, PROTECTED_PERSONAL_NAME_KEYWORDS};
use crate::model::{ChangeMap, Issue, Row, Value};
use crate::normalize::units::{convert_units, parse_units};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Preview,
    Export,
    Commit,
}

fn is_protected_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    PROTECTED_PERSONAL_NAME_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || PROTECTED_GEOGRAPHIC_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Matches `Value::is_missing`'s sentinel set, case-insensitively — an LLM
/// repair suggestion that comes back as a literal "N/A"/"NULL" placeholder
/// must be treated as no fix rather than written into the cell verbatim.
fn is_null_sentinel(value: &str) -> bool {
    let t = value.trim();
    t.is_empty() || matches!(t.to_ascii_uppercase().as_str(), "NULL" | "N/A" | "NA" | "NONE")
}

/// Reads the unit a `ScaleMismatch` suggestion standardized to (the last
/// whitespace-separated token of `"{value:.2f} {unit}"`).
fn unit_from_suggestion(suggested: &str) -> Option<String> {
    suggested.split_whitespace().last().map(|s| s.to_string())
}

pub struct ApplyResult {
    pub rows: Vec<Row>,
    pub changes: ChangeMap,
    pub applied_count: usize,
}

/// Applies `selected` Issues (already filtered to the caller's chosen IDs)
/// against `rows`, honoring unit-target resolution, protected columns, and
/// first-write-wins per-cell conflict resolution.
pub fn apply_fixes(rows: &[Row], selected: &[Issue], unit_preferences: &HashMap<String, String>) -> ApplyResult {
    let mut rows: Vec<Row> = rows.to_vec();
    let mut changes = ChangeMap::default();

    // 1. Resolve unit targets: ScaleMismatch issues propose a unit per
    // column; explicit preferences overlay (win over) what was inferred.
    let mut unit_targets: HashMap<String, String> = HashMap::new();
    for issue in selected {
        if issue.issue_type != "ScaleMismatch" {
            continue;
        }
        if let Some(suggested) = &issue.suggested_value {
            if let Some(unit) = unit_from_suggestion(suggested) {
                unit_targets.entry(issue.column.clone()).or_insert(unit);
            }
        }
    }
    for (column, unit) in unit_preferences {
        unit_targets.insert(column.clone(), unit.clone());
    }

    // 2. Standardize measurement columns wholesale: every parseable value
    // in a targeted column is reformatted, not only the flagged rows.
    let mut fixed_cells: HashSet<(usize, String)> = HashSet::new();
    for (column, target_unit) in &unit_targets {
        for row in rows.iter_mut() {
            let Some(value) = row.get(column) else { continue };
            let raw = value.to_display_string();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let converted = if let Some((numeric_value, unit, _)) = parse_units(trimmed) {
                if unit == *target_unit {
                    Some(numeric_value)
                } else {
                    convert_units(numeric_value, &unit, target_unit)
                }
            } else {
                trimmed.parse::<f64>().ok()
            };

            if let Some(numeric_value) = converted {
                let formatted = format!("{numeric_value:.2} {target_unit}");
                if formatted != raw {
                    changes.record(row.id, column, Some(raw), Some(formatted.clone()));
                    row.set(column, Value::String(formatted));
                }
                fixed_cells.insert((row.id, column.clone()));
            }
        }
    }

    // 3. Apply non-unit fixes in the order given; first write to a cell
    // wins, protected columns are never rewritten.
    for issue in selected {
        let Some(row_id) = issue.row_id else { continue };
        if issue.column.is_empty() {
            continue;
        }
        if is_protected_column(&issue.column) {
            continue;
        }
        let key = (row_id, issue.column.clone());
        if fixed_cells.contains(&key) {
            continue;
        }

        let Some(row) = rows.iter_mut().find(|r| r.id == row_id) else { continue };
        if !row.contains_column(&issue.column) {
            continue;
        }

        let old_value = row.get(&issue.column).map(|v| v.to_display_string());

        match &issue.suggested_value {
            None => {
                changes.record(row_id, &issue.column, old_value, None);
                row.set(&issue.column, Value::Null);
            }
            Some(suggested) if is_null_sentinel(suggested) => {
                changes.record(row_id, &issue.column, old_value, None);
                row.set(&issue.column, Value::Null);
            }
            Some(suggested) => {
                changes.record(row_id, &issue.column, old_value, Some(suggested.clone()));
                row.set(&issue.column, Value::String(suggested.clone()));
            }
        }

        fixed_cells.insert(key);
    }

    ApplyResult { applied_count: changes.len(), rows, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::make_issue;
    use crate::model::Value;

    fn row_with(id: usize, cols: &[(&str, &str)]) -> Row {
        let mut row = Row::new(id);
        for (c, v) in cols {
            row.push(*c, Value::from_str_cell(v));
        }
        row
    }

    #[test]
    fn first_write_wins_on_conflicting_issues() {
        let rows = vec![row_with(0, &[("email", "a@b.com")])];
        let issues = vec![
            make_issue("EmailValidation", Some(0), "email", "InvalidEmail", "a@b.com", Some("first@fix.com".to_string()), 0.9, "", ""),
            make_issue("EmailValidation", Some(0), "email", "InvalidEmail", "a@b.com", Some("second@fix.com".to_string()), 0.9, "", ""),
        ];
        let result = apply_fixes(&rows, &issues, &HashMap::new());
        assert_eq!(result.rows[0].get("email").unwrap().to_display_string(), "first@fix.com");
    }

    #[test]
    fn protected_column_is_never_rewritten() {
        let rows = vec![row_with(0, &[("full_name", "Jon Smith")])];
        let issues = vec![make_issue(
            "Semantic",
            Some(0),
            "full_name",
            "EntityResolution",
            "Jon Smith",
            Some("Jonathan Smith".to_string()),
            0.8,
            "",
            "",
        )];
        let result = apply_fixes(&rows, &issues, &HashMap::new());
        assert_eq!(result.rows[0].get("full_name").unwrap().to_display_string(), "Jon Smith");
    }

    #[test]
    fn null_suggestion_clears_the_cell() {
        let rows = vec![row_with(0, &[("job_start_date", "1990-05-01")])];
        let issues = vec![make_issue("Logic", Some(0), "job_start_date", "TemporalParadox", "1990-05-01", None, 0.95, "", "")];
        let result = apply_fixes(&rows, &issues, &HashMap::new());
        assert!(result.rows[0].get("job_start_date").unwrap().is_missing());
    }

    #[test]
    fn literal_na_suggestion_clears_the_cell_instead_of_being_written() {
        let rows = vec![row_with(0, &[("city", "")])];
        let issues = vec![make_issue("Imputation", Some(0), "city", "MissingValue", "", Some("N/A".to_string()), 0.6, "", "")];
        let result = apply_fixes(&rows, &issues, &HashMap::new());
        assert!(result.rows[0].get("city").unwrap().is_missing());
    }

    #[test]
    fn standardizes_every_parseable_value_in_targeted_unit_column() {
        let rows = vec![row_with(0, &[("height_cm", "180 cm")]), row_with(1, &[("height_cm", "6 ft")])];
        let issues =
            vec![make_issue("Units", Some(1), "height_cm", "ScaleMismatch", "6 ft", Some("182.88 cm".to_string()), 0.85, "", "")];
        let result = apply_fixes(&rows, &issues, &HashMap::new());
        assert_eq!(result.rows[0].get("height_cm").unwrap().to_display_string(), "180.00 cm");
        assert_eq!(result.rows[1].get("height_cm").unwrap().to_display_string(), "182.88 cm");
    }

    #[test]
    fn unit_preferences_override_inferred_target() {
        let rows = vec![row_with(0, &[("height_cm", "180 cm")])];
        let issues = vec![make_issue("Units", Some(0), "height_cm", "ScaleMismatch", "180 cm", Some("180.00 cm".to_string()), 0.85, "", "")];
        let mut prefs = HashMap::new();
        prefs.insert("height_cm".to_string(), "in".to_string());
        let result = apply_fixes(&rows, &issues, &prefs);
        assert!(result.rows[0].get("height_cm").unwrap().to_display_string().ends_with("in"));
    }
}
