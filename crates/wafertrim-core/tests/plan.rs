use std::io::Write;

use polars::prelude::*;
use tempfile::NamedTempFile;

use wafertrim_core::{
    filter_three_sigma, trim_to_frequency, ColumnSelector, FilterStep, Linear, Plan, PlanError,
    RateSpec, TrimVariant,
};

const FREQUENCY_PLAN: &str = r#"
[[filters]]
kind = "three_sigma"
columns = ["Freq"]
sigma = 2.0

[trim]
variant = "frequency"
target = 10.0
value_column = "Freq"
flat_location = 180

[rate]
kind = "linear"
slope = 2.0
intercept = 0.5
"#;

fn wafer() -> DataFrame {
    df!(
        "DieX" => &[-2000.0f64, -1000.0, 0.0, 1000.0, 2000.0, 3000.0],
        "DieY" => &[500.0f64, 1500.0, -500.0, 0.0, 2500.0, -1500.0],
        "Freq" => &[9.0f64, 9.5, 10.5, 8.0, 0.0, 9.2],
    )
    .unwrap()
}

#[test]
fn plan_run_matches_the_manual_pipeline() {
    let plan = Plan::from_toml_str(FREQUENCY_PLAN).unwrap();
    let df = wafer();

    let outcome = plan.run(&df).unwrap();

    let filtered = filter_three_sigma(&df, &[ColumnSelector::from("Freq")], 2.0).unwrap();
    let rate = Linear {
        slope: 2.0,
        intercept: 0.5,
    };
    let manual = trim_to_frequency(&filtered, 10.0, "Freq", 180, &rate).unwrap();

    assert!(outcome.frame.equals(&manual.frame));
    assert_eq!(outcome.bounds, manual.bounds);
    assert_eq!(outcome.clipped, manual.clipped);
}

#[test]
fn plan_is_read_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FREQUENCY_PLAN.as_bytes()).unwrap();

    let plan = Plan::from_path(file.path()).unwrap();
    assert_eq!(plan.filters.len(), 1);
    assert_eq!(
        plan.rate,
        RateSpec::Linear(Linear {
            slope: 2.0,
            intercept: 0.5
        })
    );

    let trim = plan.trim.unwrap();
    assert_eq!(trim.variant, TrimVariant::Frequency);
    assert_eq!(trim.flat_location, Some(180));
}

#[test]
fn missing_plan_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Plan::from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PlanError::Io { .. }));
}

#[test]
fn filter_defaults_are_filled_in() {
    let plan = Plan::from_toml_str(
        r#"
[[filters]]
kind = "three_sigma"
columns = ["V"]

[[filters]]
kind = "greater_than"
columns = ["V", 2]

[[filters]]
kind = "edge_percent"
columns = ["W"]

[[filters]]
kind = "range"
columns = ["W"]
below = 1.5
"#,
    )
    .unwrap();

    assert_eq!(
        plan.filters,
        vec![
            FilterStep::ThreeSigma {
                columns: vec![ColumnSelector::from("V")],
                sigma: 3.0,
            },
            FilterStep::GreaterThan {
                columns: vec![ColumnSelector::from("V"), ColumnSelector::Index(2)],
                threshold: 0.0,
            },
            FilterStep::EdgePercent {
                columns: vec![ColumnSelector::from("W")],
                pct: 0.05,
            },
            FilterStep::Range {
                columns: vec![ColumnSelector::from("W")],
                above: None,
                below: Some(1.5),
            },
        ]
    );
    assert!(plan.trim.is_none());
    assert_eq!(plan.rate, RateSpec::Identity);
}

#[test]
fn filter_only_plans_apply_in_order() {
    let plan = Plan::from_toml_str(
        r#"
[[filters]]
kind = "greater_than"
columns = ["Freq"]

[[filters]]
kind = "less_than"
columns = [2]
threshold = 10.0
"#,
    )
    .unwrap();

    let filtered = plan.apply_filters(&wafer()).unwrap();
    let freq: Vec<f64> = filtered
        .column("Freq")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(freq, vec![9.0, 9.5, 8.0, 9.2]);

    assert!(matches!(plan.run(&wafer()), Err(PlanError::MissingTrim)));
}

#[test]
fn frequency_trim_needs_a_value_column() {
    let plan = Plan::from_toml_str(
        r#"
[trim]
variant = "frequency"
target = 10.0
"#,
    )
    .unwrap();

    assert!(matches!(
        plan.run(&wafer()),
        Err(PlanError::MissingField("trim.value_column"))
    ));
}

#[test]
fn thickness_plan_uses_mapper_columns() {
    let plan = Plan::from_toml_str(
        r#"
[trim]
variant = "thickness"
target = 1000.0

[rate]
kind = "polynomial"
coefficients = [3.0, 0.0, 0.0]
"#,
    )
    .unwrap();
    let df = df!(
        "Die x (mm)" => &[0.0f64, 5.0],
        "Die y (mm)" => &[1.0f64, -1.0],
        "Site 1 Layer 1 Thickness (A)" => &[1010.0f64, 980.0],
    )
    .unwrap();

    let outcome = plan.run(&df).unwrap();
    let shift: Vec<f64> = outcome
        .frame
        .column("shift")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(shift, vec![1.0, -2.0]);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Plan::from_toml_str(
        r#"
[trim]
variant = "thickness"
target = 1000.0
tolerance = 3.0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Toml(_)));

    let err = Plan::from_toml_str(
        r#"
[[filters]]
kind = "median"
columns = ["V"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Toml(_)));
}

#[test]
fn misspelled_step_parameters_are_rejected() {
    let err = Plan::from_toml_str(
        r#"
[[filters]]
kind = "three_sigma"
columns = ["V"]
sigmma = 1.0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Toml(_)));
    assert!(err.to_string().contains("sigmma"));

    let err = Plan::from_toml_str(
        r#"
[rate]
kind = "linear"
slope = 2.0
intercept = 0.0
offset = 1.0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Toml(_)));
}

#[test]
fn test_step_supplies_the_value_column() {
    let plan = Plan::from_toml_str(
        r#"
[trim]
variant = "frequency"
target = 10.0
test_step = "ResonatorMap"
"#,
    )
    .unwrap();
    let df = df!(
        "DieX" => &[1000.0f64, 2000.0],
        "DieY" => &[0.0f64, 0.0],
        "resfreq_1" => &[9.0f64, 8.0],
    )
    .unwrap();

    let outcome = plan.run(&df).unwrap();
    let shift: Vec<f64> = outcome
        .frame
        .column("shift")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(shift, vec![1.0, 2.0]);
}

#[test]
fn prefix_selectors_parse_from_inline_tables() {
    let plan = Plan::from_toml_str(
        r#"
[[filters]]
kind = "greater_than"
columns = [{ prefix = "CF" }, "Freq"]
"#,
    )
    .unwrap();
    assert_eq!(
        plan.filters,
        vec![FilterStep::GreaterThan {
            columns: vec![ColumnSelector::prefix("CF"), ColumnSelector::from("Freq")],
            threshold: 0.0,
        }]
    );
}
