//! Two-stage weather: one regional draw per day, then one draw per tile
//! around it. Tiles on the same day share a regime but nothing decays with
//! distance between them.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::SeasonalFunction;
use crate::components::WeatherSample;
use crate::config::WeatherConfig;
use crate::engine::{StepContext, VillageSystem};
use crate::error::SimResult;
use crate::rng::{RandomStream, StreamKey};
use crate::world::Village;

/// Day-wide weather regime shared by every tile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalWeather {
    pub date: NaiveDate,
    pub global_temperature: f64,
    pub aridity: f64,
    pub no_rain: bool,
    pub global_rainfall: f64,
}

#[derive(Clone, Debug)]
pub struct WeatherEngine {
    config: WeatherConfig,
    aridity: SeasonalFunction,
}

impl WeatherEngine {
    pub fn new(config: WeatherConfig) -> SimResult<Self> {
        config.validate()?;
        let aridity = SeasonalFunction::new(1.0, config.rainfall.aridity_min_date);
        Ok(Self { config, aridity })
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    /// Mean of the regional temperature draw on `date`.
    pub fn expected_global_temperature(&self, date: NaiveDate) -> SimResult<f64> {
        let t = &self.config.temperature;
        Ok(t.mean + t.seasonality.value(date)?)
    }

    pub fn aridity(&self, date: NaiveDate) -> SimResult<f64> {
        let r = &self.config.rainfall;
        self.aridity.bounded(date, r.aridity_min, r.aridity_max)
    }

    pub fn regional(&self, stream: &RandomStream, date: NaiveDate, day: i64) -> SimResult<RegionalWeather> {
        let key = StreamKey::new("weather").with("regional");
        let t = &self.config.temperature;
        let r = &self.config.rainfall;

        let global_temperature = stream.normal(
            key.with("temperature"),
            day,
            self.expected_global_temperature(date)?,
            t.stochastic_variability,
        )?;

        let aridity = self.aridity(date)?;
        let no_rain = stream.chance(key.with("no_rain"), day, r.dry_probability * aridity)?;
        let global_rainfall = if no_rain {
            0.0
        } else {
            stream.gamma(key.with("rainfall"), day, r.gamma_shape, r.gamma_scale * aridity)?
        };

        Ok(RegionalWeather {
            date,
            global_temperature,
            aridity,
            no_rain,
            global_rainfall,
        })
    }

    pub fn local(
        &self,
        stream: &RandomStream,
        regional: &RegionalWeather,
        tile_key: StreamKey,
        day: i64,
    ) -> SimResult<WeatherSample> {
        let temperature = stream.normal(
            tile_key.with("temperature"),
            day,
            regional.global_temperature,
            self.config.temperature.local_variability,
        )?;
        let rainfall = if regional.no_rain || regional.global_rainfall <= 0.0 {
            0.0
        } else {
            stream.truncated_normal(
                tile_key.with("rainfall"),
                day,
                regional.global_rainfall,
                self.config.rainfall.local_variability * regional.global_rainfall,
            )?
        };
        Ok(WeatherSample {
            temperature,
            rainfall,
        })
    }
}

/// Samples each village's local weather for the step.
pub struct WeatherSystem {
    engine: Arc<WeatherEngine>,
}

impl WeatherSystem {
    pub fn new(engine: Arc<WeatherEngine>) -> Self {
        Self { engine }
    }
}

impl VillageSystem for WeatherSystem {
    fn name(&self) -> &str {
        "weather"
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        let key = ctx.village_key("weather", village);
        let sample = self.engine.local(ctx.stream, ctx.weather, key, ctx.day)?;
        village.weather = Some(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::rng::KeyColumns;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine() -> WeatherEngine {
        WeatherEngine::new(WeatherConfig::default()).unwrap()
    }

    #[test]
    fn test_expected_temperature_is_lowest_on_january_fifteenth() {
        let engine = engine();
        let coldest = engine.expected_global_temperature(date(2001, 1, 15)).unwrap();
        assert!((coldest - 50.0).abs() < 1e-9);
        let mut day = date(2001, 1, 1);
        while day < date(2002, 1, 1) {
            assert!(engine.expected_global_temperature(day).unwrap() >= coldest);
            day += Duration::days(1);
        }
    }

    #[test]
    fn test_aridity_is_bounded() {
        let engine = engine();
        assert!((engine.aridity(date(2001, 8, 15)).unwrap() - 0.1).abs() < 1e-12);
        let peak = engine.aridity(date(2001, 2, 13)).unwrap();
        assert!(peak <= 1.0 && peak > 0.99);
    }

    #[test]
    fn test_rainfall_is_never_negative() {
        let engine = engine();
        let stream = RandomStream::new(3);
        let columns = KeyColumns::default();
        let mut day = date(2000, 1, 1);
        for i in 0..730 {
            let regional = engine.regional(&stream, day, i).unwrap();
            assert!(regional.global_rainfall >= 0.0);
            for x in 0..4 {
                let key = StreamKey::new("weather").with_tile(&columns, x, 0);
                let sample = engine.local(&stream, &regional, key, i).unwrap();
                assert!(sample.rainfall >= 0.0);
                if regional.no_rain {
                    assert_eq!(sample.rainfall, 0.0);
                }
            }
            day += Duration::days(1);
        }
    }

    #[test]
    fn test_tiles_share_regional_draw_but_diverge_locally() {
        let engine = engine();
        let stream = RandomStream::new(9);
        let columns = KeyColumns::default();
        let regional = engine.regional(&stream, date(2000, 7, 1), 10).unwrap();
        let a = engine
            .local(&stream, &regional, StreamKey::new("weather").with_tile(&columns, 0, 0), 10)
            .unwrap();
        let b = engine
            .local(&stream, &regional, StreamKey::new("weather").with_tile(&columns, 1, 0), 10)
            .unwrap();
        assert_ne!(a.temperature, b.temperature);
        assert_eq!(regional, engine.regional(&stream, date(2000, 7, 1), 10).unwrap());
    }
}
