#![allow(dead_code)]

use std::path::Path;

use village_sim::{map::TerrainTable, Engine, EngineBuilder, Scenario, ScenarioLoader};

pub fn load_fixture() -> Scenario {
    ScenarioLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")))
        .load("scenarios/highland_valley.yaml")
        .expect("fixture scenario should load")
}

/// Fixture with a village on every tile.
pub fn fully_settled() -> Scenario {
    let mut scenario = load_fixture();
    scenario.map.village_weights = TerrainTable::uniform(1.0);
    scenario.map.village_probability = 1.0;
    scenario
}

pub fn engine(scenario: Scenario) -> Engine {
    EngineBuilder::from_scenario(scenario)
        .expect("scenario is valid")
        .build()
        .expect("engine builds")
}
