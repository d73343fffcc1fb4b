use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::components::ResourceKind;
use crate::config::{
    CropConfig, DemographicsConfig, MapConfig, PopulationConfig, RandomnessConfig,
    ResourceConfig, ResourcesConfig, TimeConfig, WeatherConfig,
};
use crate::error::{SimError, SimResult};

fn default_snapshot_interval_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_interval_days")]
    pub interval_days: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_days: default_snapshot_interval_days(),
        }
    }
}

/// Immutable run configuration, handed to the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub randomness: RandomnessConfig,
    pub time: TimeConfig,
    pub population: PopulationConfig,
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub wheat: CropConfig,
    #[serde(default)]
    pub demographics: DemographicsConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl Scenario {
    /// Parses and validates a scenario document.
    pub fn from_yaml_str(data: &str) -> SimResult<Self> {
        let scenario: Scenario =
            serde_yaml::from_str(data).map_err(|err| SimError::Config(err.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.time.step_size == 0 {
            return Err(SimError::config("time.step_size must be at least one day"));
        }
        if self.time.end <= self.time.start {
            return Err(SimError::config(format!(
                "time.end ({}) must be after time.start ({})",
                self.time.end, self.time.start
            )));
        }
        self.randomness.key_columns()?;
        for kind in ResourceKind::ALL {
            self.resource(kind).validate(&format!("resources.{}", kind.name()))?;
        }
        self.weather.validate()?;
        self.wheat.validate()?;
        self.demographics.validate()?;
        self.map.generator(self.randomness.key_columns()?)?;
        Ok(())
    }

    pub fn resource(&self, kind: ResourceKind) -> &ResourceConfig {
        match kind {
            ResourceKind::Wheat => &self.resources.wheat,
            ResourceKind::Wood => &self.resources.wood,
            ResourceKind::Stone => &self.resources.stone,
            ResourceKind::Bronze => &self.resources.bronze,
        }
    }

    /// Number of days to simulate; `override_days` wins over the configured range.
    pub fn days(&self, override_days: Option<u32>) -> u32 {
        override_days.unwrap_or_else(|| {
            u32::try_from((self.time.end - self.time.start).num_days()).unwrap_or(u32::MAX)
        })
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario = Scenario::from_yaml_str(&data)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: minimal
randomness:
  random_seed: 1
time:
  start: 2000-06-01
  end: 2000-06-02
  step_size: 1
population:
  size: 64
resources:
  wheat:
    initial_per_capita_stores: { loc: 100.0, scale: 10.0 }
    annual_per_capita_consumption: { loc: 150.0, scale: 10.0 }
    annual_per_capita_accumulation: { loc: 0.0, scale: 1.0 }
  wood:
    initial_per_capita_stores: { loc: 5.0, scale: 1.0 }
    annual_per_capita_consumption: { loc: 3.0, scale: 0.5 }
    annual_per_capita_accumulation: { loc: 4.0, scale: 0.5 }
  stone:
    initial_per_capita_stores: { loc: 2.0, scale: 0.5 }
    annual_per_capita_consumption: { loc: 1.0, scale: 0.2 }
    annual_per_capita_accumulation: { loc: 1.5, scale: 0.2 }
  bronze:
    initial_per_capita_stores: { loc: 0.5, scale: 0.1 }
    annual_per_capita_consumption: { loc: 0.2, scale: 0.05 }
    annual_per_capita_accumulation: { loc: 0.3, scale: 0.05 }
"#;

    #[test]
    fn test_minimal_scenario_gets_defaults() {
        let scenario = Scenario::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(scenario.randomness.key_columns, vec!["x", "y"]);
        assert!(!scenario.randomness.validate_interpolation);
        assert_eq!(scenario.map.width, 8);
        assert_eq!(scenario.snapshot.interval_days, 30);
        assert_eq!(scenario.days(None), 1);
        assert_eq!(scenario.days(Some(10)), 10);
    }

    #[test]
    fn test_missing_required_key_is_config_error() {
        let broken = MINIMAL.replace("  size: 64\n", "");
        let err = Scenario::from_yaml_str(&broken).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_non_numeric_loc_is_config_error() {
        let broken = MINIMAL.replace("{ loc: 2.0, scale: 0.5 }", "{ loc: lots, scale: 0.5 }");
        let err = Scenario::from_yaml_str(&broken).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_bad_time_range_is_config_error() {
        let broken = MINIMAL.replace("end: 2000-06-02", "end: 2000-05-02");
        assert!(matches!(
            Scenario::from_yaml_str(&broken),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_key_column_is_config_error() {
        let broken = MINIMAL.replace("random_seed: 1", "random_seed: 1\n  key_columns: [x, z]");
        assert!(matches!(
            Scenario::from_yaml_str(&broken),
            Err(SimError::Config(_))
        ));
    }
}
