//! End-to-end scenarios driven through the public `detect_issues` /
//! `apply_fixes_mode` surface, exercising the full detector fleet plus the
//! applier's unit-standardization and first-write-wins behavior.

use dq_pipeline::applier::ApplyMode;
use dq_pipeline::llm::{LlmGateway, StubGateway};
use dq_pipeline::model::{Dataset, Row, Value};
use dq_pipeline::orchestrator::Orchestrator;
use dq_pipeline::source::CsvArtifactSink;
use dq_pipeline::{apply_fixes_mode, detect_issues};
use std::collections::HashMap;
use std::sync::Arc;

fn row_with(id: usize, cols: &[(&str, &str)]) -> Row {
    let mut row = Row::new(id);
    for (column, value) in cols {
        row.push(*column, Value::from_str_cell(value));
    }
    row
}

fn dataset(columns: &[&str], rows: Vec<Row>) -> Dataset {
    Dataset::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

#[tokio::test]
async fn s1_invalid_email_is_flagged_and_fixed() {
    let rows = vec![
        row_with(0, &[("email", "vik@gmail")]),
        row_with(1, &[("email", "a@gmail.com")]),
        row_with(2, &[("email", "b@gmail.com")]),
    ];
    let ds = dataset(&["email"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let issue = issues.iter().find(|i| i.dirty_value == "vik@gmail").expect("missing InvalidEmail issue");
    assert_eq!(issue.issue_type, "InvalidEmail");
    assert!(issue.confidence >= 0.85);
    assert_eq!(issue.suggested_value.as_deref(), Some("vik@gmail.com"));
}

#[tokio::test]
async fn s2_compound_height_is_standardized_to_dominant_cm_unit() {
    // "70 in" is a singleton the Units detector flags outright, which
    // establishes "cm" as the column's apply-time target; the compound
    // "5ft 10in" value is parsed straight to cm already (so the detector
    // itself has nothing to flag for it) but still gets swept up by the
    // applier's wholesale reformatting pass over the targeted column.
    let rows = vec![
        row_with(0, &[("height_cm", "180 cm")]),
        row_with(1, &[("height_cm", "175 cm")]),
        row_with(2, &[("height_cm", "70 in")]),
        row_with(3, &[("height_cm", "5ft 10in")]),
    ];
    let ds = dataset(&["height_cm"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let scale_issue = issues.iter().find(|i| i.row_id == Some(2) && i.issue_type == "ScaleMismatch").unwrap();
    assert!((0.80..=0.90).contains(&scale_issue.confidence));

    let outcome = apply_fixes_mode(
        &ds.rows,
        &ds.columns,
        &issues,
        &HashMap::new(),
        ApplyMode::Preview,
        "people.csv",
        &CsvArtifactSink::new(std::env::temp_dir()),
    )
    .unwrap();

    assert_eq!(outcome.rows[3].get("height_cm").unwrap().to_display_string(), "177.80 cm");
}

#[tokio::test]
async fn s3_city_state_country_mismatch_is_corrected() {
    let rows = vec![row_with(0, &[("city", "Mumbai"), ("state", "Florida"), ("country", "USA")])];
    let ds = dataset(&["city", "state", "country"], rows);

    let gateway: Arc<dyn LlmGateway> = Arc::new(
        StubGateway::new()
            .with_response("state/province", r#"{"state": "Maharashtra", "confidence": 0.9}"#)
            .with_response("country", r#"{"country": "India", "confidence": 0.9}"#),
    );
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, Some(gateway)).await;

    let state_issue = issues.iter().find(|i| i.issue_type == "IncorrectState").expect("missing IncorrectState");
    assert_eq!(state_issue.suggested_value.as_deref(), Some("Maharashtra"));
    assert!((0.85..=0.9).contains(&state_issue.confidence));

    let country_issue = issues.iter().find(|i| i.issue_type == "IncorrectCountry").expect("missing IncorrectCountry");
    assert_eq!(country_issue.suggested_value.as_deref(), Some("India"));
}

#[tokio::test]
async fn s4_company_abbreviation_standardizes_to_full_name() {
    let rows: Vec<Row> = vec![
        row_with(0, &[("company", "MS")]),
        row_with(1, &[("company", "MS")]),
        row_with(2, &[("company", "Microsoft")]),
        row_with(3, &[("company", "Microsoft")]),
        row_with(4, &[("company", "Microsoft")]),
    ];
    let ds = dataset(&["company"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let ms_issues: Vec<_> = issues.iter().filter(|i| i.dirty_value == "MS" && i.category == "CompanyValidation").collect();
    assert_eq!(ms_issues.len(), 2);
    assert!(ms_issues.iter().all(|i| i.suggested_value.as_deref() == Some("Microsoft")));
}

#[tokio::test]
async fn s5_job_start_before_birth_is_cleared() {
    let rows = vec![row_with(0, &[("birth_date", "2000-01-01"), ("job_start_date", "1990-05-01")])];
    let ds = dataset(&["birth_date", "job_start_date"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let paradox = issues.iter().find(|i| i.issue_type == "TemporalParadox").expect("missing TemporalParadox");
    assert_eq!(paradox.column, "job_start_date");
    assert!(paradox.suggested_value.is_none());

    let outcome = apply_fixes_mode(
        &ds.rows,
        &ds.columns,
        &issues,
        &HashMap::new(),
        ApplyMode::Preview,
        "employees.csv",
        &CsvArtifactSink::new(std::env::temp_dir()),
    )
    .unwrap();
    assert!(outcome.rows[0].get("job_start_date").unwrap().is_missing());
}

#[tokio::test]
async fn s6_phone_normalizes_using_the_country_column() {
    let rows = vec![row_with(0, &[("phone", "(555) 123-4567"), ("country", "India"), ("city", "Pune")])];
    let ds = dataset(&["phone", "country", "city"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let phone_issue = issues.iter().find(|i| i.issue_type == "PhoneNormalization").expect("missing PhoneNormalization");
    assert_eq!(phone_issue.suggested_value.as_deref(), Some("+91 5551234567"));
}

#[tokio::test]
async fn export_mode_writes_a_cleaned_csv_next_to_detected_issues() {
    let rows = vec![row_with(0, &[("email", "vik@gmail")]), row_with(1, &[("email", "a@gmail.com")])];
    let ds = dataset(&["email"], rows);
    let orchestrator = Orchestrator::new(None, 300);
    let (issues, _summary) = detect_issues(&ds, &orchestrator, None).await;

    let dir = std::env::temp_dir().join(format!("dq-pipeline-pipeline-test-{}", std::process::id()));
    let sink = CsvArtifactSink::new(&dir);
    let outcome = apply_fixes_mode(&ds.rows, &ds.columns, &issues, &HashMap::new(), ApplyMode::Export, "customers.csv", &sink).unwrap();

    let locator = outcome.locator.expect("export mode should return a locator");
    assert!(locator.ends_with("customers_cleaned.csv"));
    let written = std::fs::read_to_string(&locator).unwrap();
    assert!(written.contains("vik@gmail.com"));
    std::fs::remove_dir_all(&dir).ok();
}
