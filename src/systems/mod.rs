mod demographics;
mod farming;
mod food;
mod resources;
mod weather;

pub use demographics::DemographicsSystem;
pub use farming::{CropSystem, NeutralRainfall, RainfallEffect, TemperatureResponse};
pub use food::{ration, FoodSystem};
pub use resources::{default_ceiling, default_regeneration, ResourceModel, ResourceSystem};
pub use weather::{RegionalWeather, WeatherEngine, WeatherSystem};

#[cfg(test)]
pub(crate) mod testing;
