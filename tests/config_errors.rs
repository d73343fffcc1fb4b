use std::fs;

use tempfile::tempdir;
use village_sim::{EngineBuilder, Scenario, ScenarioLoader, SimError};

fn fixture_text() -> String {
    fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/highland_valley.yaml"))
        .expect("fixture exists")
}

fn load_variant(text: &str) -> anyhow::Result<Scenario> {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("variant.yaml"), text).expect("write variant");
    ScenarioLoader::new(dir.path()).load("variant.yaml")
}

fn is_config_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SimError>(), Some(SimError::Config(_)))
}

#[test]
fn fixture_loads() {
    let scenario = load_variant(&fixture_text()).expect("fixture is valid");
    assert_eq!(scenario.name, "highland_valley");
    assert_eq!(scenario.population.size, 64);
}

#[test]
fn missing_resource_block_is_rejected() {
    let text = fixture_text();
    let start = text.find("  bronze:").unwrap();
    let end = text.find("wheat:\n  sowing_date").unwrap();
    let broken = format!("{}{}", &text[..start], &text[end..]);
    let err = load_variant(&broken).unwrap_err();
    assert!(is_config_error(&err), "{err:?}");
}

#[test]
fn non_numeric_scale_is_rejected() {
    let broken = fixture_text().replace("{ loc: 1.0, scale: 0.3 }", "{ loc: 1.0, scale: wide }");
    let err = load_variant(&broken).unwrap_err();
    assert!(is_config_error(&err), "{err:?}");
}

#[test]
fn zero_scale_is_rejected() {
    let broken = fixture_text().replace("{ loc: 4.0, scale: 1.0 }", "{ loc: 4.0, scale: 0.0 }");
    let err = load_variant(&broken).unwrap_err();
    assert!(is_config_error(&err), "{err:?}");
}

#[test]
fn zero_step_is_rejected() {
    let broken = fixture_text().replace("step_size: 1", "step_size: 0");
    let err = load_variant(&broken).unwrap_err();
    assert!(is_config_error(&err), "{err:?}");
}

#[test]
fn missing_file_has_context() {
    let dir = tempdir().expect("tempdir");
    let err = ScenarioLoader::new(dir.path()).load("absent.yaml").unwrap_err();
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn builder_revalidates_edited_scenarios() {
    let mut scenario = Scenario::from_yaml_str(&fixture_text()).unwrap();
    scenario.demographics.fertility_amplitude = 1.5;
    assert!(matches!(
        EngineBuilder::from_scenario(scenario),
        Err(SimError::Config(_))
    ));
}

#[test]
fn zero_snapshot_interval_is_accepted() {
    let text = fixture_text().replace("interval_days: 30", "interval_days: 0");
    let scenario = load_variant(&text).expect("interval 0 disables snapshots");
    assert_eq!(scenario.snapshot.interval_days, 0);
}
