pub mod calendar;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod map;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod systems;
pub mod web;
pub mod world;

pub use engine::{Engine, EngineBuilder, EngineSettings, StopHandle};
pub use error::{SimError, SimResult};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{SimulationSnapshot, SimulationState};
