//! End-to-end tests: report file in, result record and verdict out.

use module_metrology::parser::reference::ReferenceError;
use module_metrology::parser::report::ReportParseError;
use module_metrology::prelude::*;
use module_metrology::{ReferenceTable, StaticReferenceSource, UploadPayload};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn site_config() -> SiteConfig {
    SiteConfig {
        positions_dir: fixture_path("positions"),
        ..SiteConfig::default()
    }
}

fn pipeline() -> MetrologyCore {
    MetrologyCore::new(site_config()).unwrap()
}

fn sample_text() -> String {
    std::fs::read_to_string(fixture_path("R0_sample.txt")).unwrap()
}

fn dev(dx: f64, dy: f64) -> Deviation {
    Deviation { dx, dy }
}

#[test]
fn test_sample_report_passes() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_sample.txt"), &ProcessOptions::default())
        .unwrap();

    assert!(outcome.passed(), "issues: {:?}", outcome.verdict.messages());
    assert_eq!(outcome.verdict.summary(), "All tests passed! Proceed to upload.");

    let record = &outcome.record;
    assert_eq!(record.component, "20USEM00000042");
    assert_eq!(record.test_type, "MODULE_METROLOGY");
    assert_eq!(record.institution, "TRIUMF");
    assert_eq!(record.run_number, "7");
    assert_eq!(record.date, "2024-03-14");
    assert_eq!(record.properties.operator, "Jane Q Doe");
    assert_eq!(record.properties.machine, "Mitutoyo CMM");
    assert_eq!(record.properties.script_version, "v1");

    let results = &record.results;
    assert!(results.passed);
    assert!(!results.problems);
    assert!(results.file.ends_with("R0_sample.txt"));

    let hybrid = results.hybrid_position.as_ref().unwrap();
    assert_eq!(hybrid.len(), 3);
    assert_eq!(hybrid["R0H0_1"], dev(10.0, 30.0));
    assert_eq!(hybrid["R0H0_2"], dev(4.99, -14.99));
    assert_eq!(hybrid["R0H1_1"], dev(40.0, 19.99));

    let pb = results.pb_position.as_ref().unwrap();
    assert_eq!(pb.len(), 2);
    assert_eq!(pb["PB_1"], dev(19.99, 9.99));
    assert_eq!(pb["PB_2"], dev(0.0, -50.0));
}

#[test]
fn test_sample_heights_after_tilt_correction() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_sample.txt"), &ProcessOptions::default())
        .unwrap();
    let results = &outcome.record.results;

    let caps = results.cap_height.as_ref().unwrap();
    assert_eq!(caps.len(), 2);
    assert_eq!(caps["C1"], 150.0);
    assert_eq!(caps["C2"], 220.5);

    let hybrid_glue = results.hybrid_glue_thickness.as_ref().unwrap();
    assert_eq!(hybrid_glue["GT_R0H0_1"], 120.0);
    assert_eq!(hybrid_glue["GT_R0H1_1"], 112.5);

    let pb_glue = results.pb_glue_thickness.as_ref().unwrap();
    assert_eq!(pb_glue.len(), 1);
    assert_eq!(pb_glue["GT_PB_1"], 120.0);

    // Highest reading over both shield groups
    assert_eq!(results.shieldbox_height, Some(5650.0));

    assert_eq!(
        outcome.metrics.unclassified,
        vec!["Sensor".to_string(), "Fiducial_A".to_string()]
    );
}

#[test]
fn test_record_json_is_deterministic() {
    let core = pipeline();
    let path = fixture_path("R0_sample.txt");
    let first = core.process_file(&path, &ProcessOptions::default()).unwrap();
    let second = core.process_file(&path, &ProcessOptions::default()).unwrap();

    assert_eq!(first.record, second.record);
    assert_eq!(
        first.record.to_json_pretty().unwrap(),
        second.record.to_json_pretty().unwrap()
    );
}

#[test]
fn test_record_json_shape() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_sample.txt"), &ProcessOptions { problems: true })
        .unwrap();
    let json = serde_json::to_value(&outcome.record).unwrap();

    assert_eq!(json["testType"], "MODULE_METROLOGY");
    assert_eq!(json["runNumber"], "7");
    assert_eq!(json["properties"]["SCRIPT_VERSION"], "v1");
    assert_eq!(json["results"]["PB_POSITION"]["PB_1"][0], 19.99);
    assert_eq!(json["results"]["PB_POSITION"]["PB_1"][1], 9.99);
    assert_eq!(json["results"]["HYBRID_GLUE_THICKNESS"]["GT_R0H1_1"], 112.5);
    assert_eq!(json["results"]["SHIELDBOX_HEIGHT"], 5650.0);
    assert_eq!(json["results"]["passed"], true);
    assert_eq!(json["results"]["problems"], true);
}

#[test]
fn test_failing_report_lists_every_failure() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_failing.txt"), &ProcessOptions::default())
        .unwrap();

    assert!(!outcome.passed());
    assert!(!outcome.record.results.passed);
    assert_eq!(
        outcome.verdict.summary(),
        "One or more failures. Upload if you wish."
    );

    let ids: Vec<_> = outcome
        .verdict
        .issues
        .iter()
        .map(|i| i.check_id.as_str())
        .collect();
    assert_eq!(ids, vec!["position", "hybrid_glue_thickness", "shield_height"]);

    let messages = outcome.verdict.messages();
    assert_eq!(
        messages[0],
        "Failure - Position exceeds tolerance in one or more dimensions. (R0H0_2)"
    );
    assert_eq!(
        messages[1],
        "Failure - Hybrid glue thickness exceeds tolerance. (GT_R0H0_1)"
    );
    assert!(messages[2].starts_with("Failure - Shield is too high"));

    let results = &outcome.record.results;
    assert_eq!(results.hybrid_position.as_ref().unwrap()["R0H0_2"], dev(150.0, -14.99));
    assert_eq!(results.hybrid_glue_thickness.as_ref().unwrap()["GT_R0H0_1"], 50.0);
    assert_eq!(results.shieldbox_height, Some(5750.0));
}

#[test]
fn test_absent_categories_serialize_as_null() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_failing.txt"), &ProcessOptions::default())
        .unwrap();
    let json = serde_json::to_value(&outcome.record).unwrap();

    assert!(json["results"]["PB_POSITION"].is_null());
    assert!(json["results"]["PB_GLUE_THICKNESS"].is_null());
    assert!(!json["results"]["CAP_HEIGHT"].is_null());
}

#[test]
fn test_report_without_shield_points() {
    let text: String = sample_text()
        .lines()
        .filter(|line| !line.starts_with("Shield"))
        .map(|line| format!("{}\n", line))
        .collect();

    let outcome = pipeline()
        .process_str(&text, "no_shield.txt", &ProcessOptions::default())
        .unwrap();
    assert_eq!(outcome.record.results.shieldbox_height, None);
    assert!(outcome.passed());
}

#[test]
fn test_unknown_position_point_aborts() {
    let text = sample_text().replace("PB_2 160.000", "PB_9 160.000");
    let err = pipeline()
        .process_str(&text, "unknown.txt", &ProcessOptions::default())
        .unwrap_err();

    match &err {
        MetrologyError::Reference(ReferenceError::UnknownPoint { name, line, .. }) => {
            assert_eq!(name, "PB_9");
            assert_eq!(*line, 17);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unknown point 'PB_9'"));
}

#[test]
fn test_corrupt_measurement_line_aborts() {
    let err = pipeline()
        .process_file(
            &fixture_path("corrupt_measurement.txt"),
            &ProcessOptions::default(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        MetrologyError::Parse(ReportParseError::TokenCount {
            line: 28,
            expected: 5,
            found: 4,
            ..
        })
    ));
    assert!(err.to_string().starts_with("Corrupt input file: Line 28"));
}

#[test]
fn test_missing_reference_table() {
    let text = sample_text().replace("Module Type: R0", "Module Type: R5");
    let err = pipeline()
        .process_str(&text, "r5.txt", &ProcessOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        MetrologyError::Reference(ReferenceError::Missing(_))
    ));
}

#[test]
fn test_static_reference_source_matches_directory() {
    let csv = std::fs::read_to_string(fixture_path("positions/R0_positions.csv")).unwrap();
    let table = ReferenceTable::from_csv_str("R0", &csv).unwrap();
    let core = MetrologyCore::new(SiteConfig::default())
        .unwrap()
        .with_references(StaticReferenceSource::new().with_table(table));

    let from_static = core
        .process_str(&sample_text(), "R0_sample.txt", &ProcessOptions::default())
        .unwrap();
    let from_dir = pipeline()
        .process_str(&sample_text(), "R0_sample.txt", &ProcessOptions::default())
        .unwrap();
    assert_eq!(from_static.record, from_dir.record);
}

#[test]
fn test_site_override_changes_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("site.json");
    let json = serde_json::json!({
        "positions_dir": fixture_path("positions"),
        "glue_range": { "min": 125.0, "max": 160.0 },
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let config = SiteConfig::load(&config_path).unwrap();
    assert_eq!(config.institute, "TRIUMF");
    let outcome = MetrologyCore::new(config)
        .unwrap()
        .process_file(&fixture_path("R0_sample.txt"), &ProcessOptions::default())
        .unwrap();

    let ids: Vec<_> = outcome
        .verdict
        .issues
        .iter()
        .map(|i| i.check_id.as_str())
        .collect();
    assert_eq!(ids, vec!["hybrid_glue_thickness", "pb_glue_thickness"]);
}

#[test]
fn test_other_site_report_still_processed() {
    let text = sample_text().replace("Institute: TRIUMF", "Institute: SFU");
    let outcome = pipeline()
        .process_str(&text, "sfu.txt", &ProcessOptions::default())
        .unwrap();
    assert_eq!(outcome.record.institution, "SFU");
}

#[test]
fn test_upload_payload_attaches_original_file() {
    let outcome = pipeline()
        .process_file(&fixture_path("R0_sample.txt"), &ProcessOptions::default())
        .unwrap();
    let payload = UploadPayload::new(outcome.record);

    assert_eq!(payload.attachment.title, "R0_sample.txt");
    assert_eq!(payload.attachment.kind, "file");
    assert_eq!(
        payload.attachment.description,
        "Automatic Attachment of Original Data File"
    );
}

#[test]
fn test_process_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(fixture_path("R0_sample.txt"), dir.path().join("a_sample.txt")).unwrap();
    std::fs::copy(fixture_path("R0_failing.txt"), dir.path().join("b_failing.rpt")).unwrap();
    std::fs::copy(
        fixture_path("corrupt_measurement.txt"),
        dir.path().join("c_corrupt.dat"),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.md"), "not a report").unwrap();
    std::fs::create_dir(dir.path().join("run2")).unwrap();
    std::fs::copy(fixture_path("R0_sample.txt"), dir.path().join("run2").join("d.txt")).unwrap();

    let entries = pipeline()
        .process_directory(dir.path(), &ProcessOptions::default())
        .unwrap();

    let names: Vec<_> = entries
        .iter()
        .map(|e| e.file.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a_sample.txt", "b_failing.rpt", "c_corrupt.dat", "d.txt"]);

    assert!(entries[0].outcome.as_ref().unwrap().passed());
    assert!(!entries[1].outcome.as_ref().unwrap().passed());
    assert!(matches!(entries[2].outcome, Err(MetrologyError::Parse(_))));
    assert!(entries[3].outcome.as_ref().unwrap().passed());
}
