//! Fixtures for running a single system against a hand-built village.

use chrono::NaiveDate;

use crate::components::{ResourceKind, ResourceStock};
use crate::engine::StepContext;
use crate::map::{Terrain, Tile};
use crate::rng::{KeyColumns, RandomStream};
use crate::systems::RegionalWeather;
use crate::world::Village;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Grassland village at (0, 0) with empty stores of every resource.
pub(crate) fn village(females: u64, males: u64) -> Village {
    let tile = Tile {
        x: 0,
        y: 0,
        terrain: Terrain::Grassland,
        elevation: None,
        arable_land: 10.0,
        has_village: true,
    };
    let mut village = Village::new(&tile, females, males);
    for kind in ResourceKind::ALL {
        village.stocks.insert(kind, ResourceStock::new(kind, 0.0, 0.0));
    }
    village
}

pub(crate) fn regional(date: NaiveDate) -> RegionalWeather {
    RegionalWeather {
        date,
        global_temperature: 55.0,
        aridity: 0.5,
        no_rain: false,
        global_rainfall: 1.0,
    }
}

pub(crate) fn context<'a>(
    date: NaiveDate,
    day: i64,
    step_days: u32,
    stream: &'a RandomStream,
    weather: &'a RegionalWeather,
) -> StepContext<'a> {
    StepContext {
        date,
        day,
        step_days,
        stream,
        key_columns: KeyColumns::default(),
        weather,
    }
}
