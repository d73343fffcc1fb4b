//! Parameter blocks of a scenario file and their defaults.

use serde::{Deserialize, Serialize};

use crate::calendar::{MonthDay, SeasonalFunction};
use crate::error::{SimError, SimResult};
use crate::map::{CategoricalTerrain, MapGenerator, TerrainPlacement, TerrainTable};
use crate::rng::KeyColumns;

/// Location/scale pair of a normal distribution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalParams {
    pub loc: f64,
    pub scale: f64,
}

impl NormalParams {
    pub const fn new(loc: f64, scale: f64) -> Self {
        Self { loc, scale }
    }

    pub(crate) fn validate(&self, label: &str) -> SimResult<()> {
        if !self.loc.is_finite() || !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SimError::config(format!(
                "{label} needs a finite loc and a positive scale, got loc={} scale={}",
                self.loc, self.scale
            )));
        }
        Ok(())
    }
}

fn default_key_columns() -> Vec<String> {
    vec!["x".to_string(), "y".to_string()]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomnessConfig {
    pub random_seed: u64,
    #[serde(default = "default_key_columns")]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub validate_interpolation: bool,
}

impl RandomnessConfig {
    pub fn key_columns(&self) -> SimResult<KeyColumns> {
        KeyColumns::from_names(&self.key_columns)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeConfig {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    pub step_size: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Initial head count of every village.
    pub size: u64,
}

fn default_map_width() -> u32 {
    8
}

fn default_map_height() -> u32 {
    5
}

fn default_terrain_weights() -> TerrainTable<f64> {
    TerrainTable {
        forest: 0.3,
        high_mountain: 0.1,
        desert: 0.1,
        sea: 0.15,
        grassland: 0.35,
    }
}

fn default_village_weights() -> TerrainTable<f64> {
    TerrainTable {
        forest: 1.0,
        high_mountain: 0.3,
        desert: 0.2,
        sea: 0.0,
        grassland: 2.0,
    }
}

fn default_village_probability() -> f64 {
    0.2
}

fn default_arable_fraction() -> TerrainTable<NormalParams> {
    TerrainTable {
        forest: NormalParams::new(0.3, 0.1),
        high_mountain: NormalParams::new(0.05, 0.02),
        desert: NormalParams::new(0.05, 0.02),
        sea: NormalParams::new(0.01, 0.005),
        grassland: NormalParams::new(0.7, 0.1),
    }
}

fn default_land_per_tile() -> f64 {
    200.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_map_width")]
    pub width: u32,
    #[serde(default = "default_map_height")]
    pub height: u32,
    #[serde(default = "default_terrain_weights")]
    pub terrain_weights: TerrainTable<f64>,
    /// Relative village affinity per terrain, rescaled to `village_probability`.
    #[serde(default = "default_village_weights")]
    pub village_weights: TerrainTable<f64>,
    #[serde(default = "default_village_probability")]
    pub village_probability: f64,
    #[serde(default = "default_arable_fraction")]
    pub arable_fraction: TerrainTable<NormalParams>,
    #[serde(default = "default_land_per_tile")]
    pub land_per_tile: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_map_width(),
            height: default_map_height(),
            terrain_weights: default_terrain_weights(),
            village_weights: default_village_weights(),
            village_probability: default_village_probability(),
            arable_fraction: default_arable_fraction(),
            land_per_tile: default_land_per_tile(),
        }
    }
}

impl MapConfig {
    pub fn generator(&self, key_columns: KeyColumns) -> SimResult<MapGenerator> {
        if !(0.0..=1.0).contains(&self.village_probability) {
            return Err(SimError::config(format!(
                "map.village_probability must lie in [0, 1], got {}",
                self.village_probability
            )));
        }
        if !self.land_per_tile.is_finite() || self.land_per_tile < 0.0 {
            return Err(SimError::config("map.land_per_tile must be non-negative"));
        }
        for terrain in crate::map::Terrain::ALL {
            self.arable_fraction
                .get(terrain)
                .validate(&format!("map.arable_fraction.{terrain:?}"))?;
        }
        let terrain = CategoricalTerrain::new(self.terrain_weights)?;
        let placement =
            TerrainPlacement::scaled_to_mean(self.village_probability, self.village_weights, &terrain)?;
        Ok(MapGenerator {
            terrain: Box::new(terrain),
            placement: Box::new(placement),
            arable_fraction: self.arable_fraction,
            land_per_tile: self.land_per_tile,
            key_columns,
        })
    }
}

fn default_temperature_mean() -> f64 {
    65.0
}

fn default_temperature_seasonality() -> SeasonalFunction {
    SeasonalFunction::new(15.0, MonthDay::new(1, 15))
}

fn default_temperature_variability() -> f64 {
    5.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemperatureConfig {
    #[serde(default = "default_temperature_mean")]
    pub mean: f64,
    #[serde(default = "default_temperature_seasonality")]
    pub seasonality: SeasonalFunction,
    /// Std of the day's regional draw.
    #[serde(default = "default_temperature_variability")]
    pub stochastic_variability: f64,
    /// Std of each tile's draw around the regional value.
    #[serde(default = "default_temperature_variability")]
    pub local_variability: f64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            mean: default_temperature_mean(),
            seasonality: default_temperature_seasonality(),
            stochastic_variability: default_temperature_variability(),
            local_variability: default_temperature_variability(),
        }
    }
}

fn default_aridity_min() -> f64 {
    0.1
}

fn default_aridity_max() -> f64 {
    1.0
}

fn default_aridity_min_date() -> MonthDay {
    MonthDay::new(8, 15)
}

fn default_dry_probability() -> f64 {
    0.55
}

fn default_gamma_shape() -> f64 {
    0.9902
}

fn default_gamma_scale() -> f64 {
    15.0
}

fn default_rainfall_local_variability() -> f64 {
    0.05
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RainfallConfig {
    #[serde(default = "default_aridity_min")]
    pub aridity_min: f64,
    #[serde(default = "default_aridity_max")]
    pub aridity_max: f64,
    #[serde(default = "default_aridity_min_date")]
    pub aridity_min_date: MonthDay,
    #[serde(default = "default_dry_probability")]
    pub dry_probability: f64,
    #[serde(default = "default_gamma_shape")]
    pub gamma_shape: f64,
    #[serde(default = "default_gamma_scale")]
    pub gamma_scale: f64,
    /// Tile std as a fraction of the regional rainfall.
    #[serde(default = "default_rainfall_local_variability")]
    pub local_variability: f64,
}

impl Default for RainfallConfig {
    fn default() -> Self {
        Self {
            aridity_min: default_aridity_min(),
            aridity_max: default_aridity_max(),
            aridity_min_date: default_aridity_min_date(),
            dry_probability: default_dry_probability(),
            gamma_shape: default_gamma_shape(),
            gamma_scale: default_gamma_scale(),
            local_variability: default_rainfall_local_variability(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub temperature: TemperatureConfig,
    #[serde(default)]
    pub rainfall: RainfallConfig,
}

impl WeatherConfig {
    pub fn validate(&self) -> SimResult<()> {
        let t = &self.temperature;
        let r = &self.rainfall;
        t.seasonality.min_date.validate()?;
        r.aridity_min_date.validate()?;
        if !(t.stochastic_variability > 0.0 && t.local_variability > 0.0) {
            return Err(SimError::config("weather.temperature variabilities must be > 0"));
        }
        if !(0.0 < r.aridity_min && r.aridity_min <= r.aridity_max) {
            return Err(SimError::config(
                "weather.rainfall needs 0 < aridity_min <= aridity_max",
            ));
        }
        if !(0.0..=1.0).contains(&(r.dry_probability * r.aridity_max)) {
            return Err(SimError::config(
                "weather.rainfall.dry_probability * aridity_max must lie in [0, 1]",
            ));
        }
        if !(r.gamma_shape > 0.0 && r.gamma_scale > 0.0 && r.local_variability > 0.0) {
            return Err(SimError::config(
                "weather.rainfall gamma parameters and local_variability must be > 0",
            ));
        }
        Ok(())
    }
}

fn default_sowing_date() -> MonthDay {
    MonthDay::new(10, 15)
}

fn default_harvest_date() -> MonthDay {
    MonthDay::new(5, 15)
}

fn default_land_per_capita() -> f64 {
    1.0
}

fn default_baseline_yield() -> f64 {
    10.0
}

fn default_equilibrium_temperature() -> f64 {
    55.0
}

/// Daily yield multiplier by deviation (°F) from the equilibrium temperature.
/// Heat hurts more than the same amount of cold helps.
fn default_temperature_response() -> Vec<[f64; 2]> {
    vec![
        [-40.0, 1.0040],
        [-20.0, 1.0020],
        [0.0, 1.0],
        [10.0, 0.9980],
        [20.0, 0.9940],
        [40.0, 0.9800],
    ]
}

fn default_mid_window_days() -> i64 {
    180
}

fn default_late_window_days() -> i64 {
    90
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CropConfig {
    #[serde(default = "default_sowing_date")]
    pub sowing_date: MonthDay,
    #[serde(default = "default_harvest_date")]
    pub harvest_date: MonthDay,
    #[serde(default = "default_land_per_capita")]
    pub land_per_capita: f64,
    #[serde(default = "default_baseline_yield")]
    pub baseline_yield_per_land: f64,
    #[serde(default = "default_equilibrium_temperature")]
    pub equilibrium_temperature: f64,
    #[serde(default = "default_temperature_response")]
    pub temperature_response: Vec<[f64; 2]>,
    /// Days before harvest at which the mid-growth rainfall window opens.
    #[serde(default = "default_mid_window_days")]
    pub mid_window_days: i64,
    /// Days before harvest at which the late-growth rainfall window opens.
    #[serde(default = "default_late_window_days")]
    pub late_window_days: i64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            sowing_date: default_sowing_date(),
            harvest_date: default_harvest_date(),
            land_per_capita: default_land_per_capita(),
            baseline_yield_per_land: default_baseline_yield(),
            equilibrium_temperature: default_equilibrium_temperature(),
            temperature_response: default_temperature_response(),
            mid_window_days: default_mid_window_days(),
            late_window_days: default_late_window_days(),
        }
    }
}

impl CropConfig {
    pub fn validate(&self) -> SimResult<()> {
        self.sowing_date.validate()?;
        self.harvest_date.validate()?;
        if self.sowing_date == self.harvest_date {
            return Err(SimError::config("wheat.sowing_date and harvest_date must differ"));
        }
        if self.land_per_capita < 0.0 || self.baseline_yield_per_land < 0.0 {
            return Err(SimError::config(
                "wheat.land_per_capita and baseline_yield_per_land must be non-negative",
            ));
        }
        if !(0 < self.late_window_days && self.late_window_days < self.mid_window_days) {
            return Err(SimError::config(
                "wheat rainfall windows need 0 < late_window_days < mid_window_days",
            ));
        }
        Ok(())
    }
}

fn default_mortality_rate() -> f64 {
    0.040
}

fn default_fertility_rate() -> f64 {
    0.050
}

fn default_fertility_amplitude() -> f64 {
    0.2
}

fn default_harvest_elasticity() -> f64 {
    0.38
}

fn default_female_share() -> f64 {
    0.5
}

fn default_min_adequacy() -> f64 {
    0.05
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemographicsConfig {
    /// Deaths per person-year with adequate food.
    #[serde(default = "default_mortality_rate")]
    pub mortality_rate: f64,
    /// Births per female person-year.
    #[serde(default = "default_fertility_rate")]
    pub fertility_rate: f64,
    /// Relative seasonal swing of fertility, peaking six months after harvest.
    #[serde(default = "default_fertility_amplitude")]
    pub fertility_amplitude: f64,
    /// Relative fertility change per relative change in harvest yield.
    #[serde(default = "default_harvest_elasticity")]
    pub harvest_fertility_elasticity: f64,
    #[serde(default = "default_female_share")]
    pub initial_female_share: f64,
    #[serde(default = "default_female_share")]
    pub female_share_at_birth: f64,
    /// Floor applied to the adequacy ratio before it scales mortality.
    #[serde(default = "default_min_adequacy")]
    pub min_adequacy: f64,
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            mortality_rate: default_mortality_rate(),
            fertility_rate: default_fertility_rate(),
            fertility_amplitude: default_fertility_amplitude(),
            harvest_fertility_elasticity: default_harvest_elasticity(),
            initial_female_share: default_female_share(),
            female_share_at_birth: default_female_share(),
            min_adequacy: default_min_adequacy(),
        }
    }
}

impl DemographicsConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.mortality_rate < 0.0 || self.fertility_rate < 0.0 {
            return Err(SimError::config("demographics rates must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.fertility_amplitude) {
            return Err(SimError::config(
                "demographics.fertility_amplitude must lie in [0, 1)",
            ));
        }
        for (label, share) in [
            ("initial_female_share", self.initial_female_share),
            ("female_share_at_birth", self.female_share_at_birth),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(SimError::config(format!("demographics.{label} must lie in [0, 1]")));
            }
        }
        if !(self.min_adequacy > 0.0 && self.min_adequacy <= 1.0) {
            return Err(SimError::config("demographics.min_adequacy must lie in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub initial_per_capita_stores: NormalParams,
    pub annual_per_capita_consumption: NormalParams,
    /// Per-capita extraction capacity per year.
    pub annual_per_capita_accumulation: NormalParams,
    /// Extractable amount per tile by terrain; also the regeneration ceiling.
    #[serde(default)]
    pub potential: Option<TerrainTable<f64>>,
    /// Fraction of the ceiling regrown per year; zero for non-renewables.
    #[serde(default)]
    pub annual_regeneration: Option<f64>,
}

impl ResourceConfig {
    pub(crate) fn validate(&self, label: &str) -> SimResult<()> {
        self.initial_per_capita_stores
            .validate(&format!("{label}.initial_per_capita_stores"))?;
        self.annual_per_capita_consumption
            .validate(&format!("{label}.annual_per_capita_consumption"))?;
        self.annual_per_capita_accumulation
            .validate(&format!("{label}.annual_per_capita_accumulation"))?;
        if let Some(potential) = &self.potential {
            for terrain in crate::map::Terrain::ALL {
                let value = potential.get(terrain);
                if !value.is_finite() || value < 0.0 {
                    return Err(SimError::config(format!(
                        "{label}.potential for {terrain:?} must be non-negative"
                    )));
                }
            }
        }
        if let Some(rate) = self.annual_regeneration {
            if !rate.is_finite() || rate < 0.0 {
                return Err(SimError::config(format!(
                    "{label}.annual_regeneration must be non-negative"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub wheat: ResourceConfig,
    pub wood: ResourceConfig,
    pub stone: ResourceConfig,
    pub bronze: ResourceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        WeatherConfig::default().validate().unwrap();
        CropConfig::default().validate().unwrap();
        DemographicsConfig::default().validate().unwrap();
        assert!(MapConfig::default().generator(KeyColumns::default()).is_ok());
    }

    #[test]
    fn test_normal_params_need_positive_scale() {
        assert!(NormalParams::new(1.0, 0.0).validate("x").is_err());
        assert!(NormalParams::new(f64::NAN, 1.0).validate("x").is_err());
        assert!(NormalParams::new(1.0, 0.1).validate("x").is_ok());
    }

    #[test]
    fn test_crop_windows_must_nest() {
        let config = CropConfig {
            late_window_days: 200,
            ..CropConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }
}
