use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::Clock;
use crate::components::{
    Compartment, CropKind, CropPhase, CropState, FoodDraw, ResourceKind, ResourceStock, Sex,
    WeatherSample,
};
use crate::map::{Map, Terrain, Tile};

/// One settled tile: its people, stores and fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Village {
    pub x: u32,
    pub y: u32,
    pub terrain: Terrain,
    pub arable_land: f64,
    pub compartments: [Compartment; 2],
    pub stocks: BTreeMap<ResourceKind, ResourceStock>,
    pub crops: BTreeMap<CropKind, CropState>,
    pub weather: Option<WeatherSample>,
    pub food: FoodDraw,
}

impl Village {
    pub fn new(tile: &Tile, females: u64, males: u64) -> Self {
        Self {
            x: tile.x,
            y: tile.y,
            terrain: tile.terrain,
            arable_land: tile.arable_land,
            compartments: [
                Compartment::new(Sex::Female, females),
                Compartment::new(Sex::Male, males),
            ],
            stocks: BTreeMap::new(),
            crops: BTreeMap::new(),
            weather: None,
            food: FoodDraw::default(),
        }
    }

    pub fn population(&self) -> u64 {
        self.compartments.iter().map(|c| c.population).sum()
    }

    pub fn compartment(&self, sex: Sex) -> &Compartment {
        match sex {
            Sex::Female => &self.compartments[0],
            Sex::Male => &self.compartments[1],
        }
    }

    pub fn compartment_mut(&mut self, sex: Sex) -> &mut Compartment {
        match sex {
            Sex::Female => &mut self.compartments[0],
            Sex::Male => &mut self.compartments[1],
        }
    }

    pub fn stock(&self, kind: ResourceKind) -> Option<&ResourceStock> {
        self.stocks.get(&kind)
    }

    pub fn stock_mut(&mut self, kind: ResourceKind) -> Option<&mut ResourceStock> {
        self.stocks.get_mut(&kind)
    }

    pub fn crop(&self, kind: CropKind) -> Option<&CropState> {
        self.crops.get(&kind)
    }

    /// First broken invariant, if any.
    pub fn violation(&self) -> Option<String> {
        if let Some(detail) = self.stocks.values().find_map(ResourceStock::violation) {
            return Some(detail);
        }
        for crop in self.crops.values() {
            if !(0.0..=1.0).contains(&crop.progress_to_harvest) {
                return Some(format!(
                    "{} progress_to_harvest is {}",
                    crop.kind.name(),
                    crop.progress_to_harvest
                ));
            }
            if crop.land_under_cultivation < 0.0
                || crop.land_under_cultivation > self.arable_land
            {
                return Some(format!(
                    "{} land_under_cultivation {} outside [0, {}]",
                    crop.kind.name(),
                    crop.land_under_cultivation,
                    self.arable_land
                ));
            }
            if !(crop.projected_yield.is_finite() && crop.projected_yield >= 0.0) {
                return Some(format!(
                    "{} projected_yield is {}",
                    crop.kind.name(),
                    crop.projected_yield
                ));
            }
        }
        if let Some(weather) = self.weather {
            if !(weather.rainfall >= 0.0) {
                return Some(format!("rainfall is {}", weather.rainfall));
            }
        }
        None
    }

    pub fn snapshot(&self) -> VillageSnapshot {
        VillageSnapshot {
            x: self.x,
            y: self.y,
            terrain: self.terrain,
            females: self.compartment(Sex::Female).population,
            males: self.compartment(Sex::Male).population,
            population: self.population(),
            stocks: self
                .stocks
                .iter()
                .map(|(kind, stock)| {
                    (
                        *kind,
                        StockSnapshot {
                            stored: stock.stored,
                            potential: stock.potential,
                            extracted: stock.last_flow.extracted,
                            consumed: stock.last_flow.consumed,
                            regenerated: stock.last_flow.regenerated,
                            deposited: stock.last_flow.deposited,
                        },
                    )
                })
                .collect(),
            crops: self
                .crops
                .values()
                .map(|crop| CropSnapshot {
                    kind: crop.kind,
                    phase: crop.phase,
                    sow_date: crop.sow_date,
                    harvest_date: crop.harvest_date,
                    land_under_cultivation: crop.land_under_cultivation,
                    progress_to_harvest: crop.progress_to_harvest,
                    projected_yield: crop.projected_yield,
                    last_harvest: crop.last_harvest,
                })
                .collect(),
            weather: self.weather,
            food: self.food,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub stored: f64,
    pub potential: f64,
    pub extracted: f64,
    pub consumed: f64,
    pub regenerated: f64,
    pub deposited: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSnapshot {
    pub kind: CropKind,
    pub phase: CropPhase,
    pub sow_date: NaiveDate,
    pub harvest_date: NaiveDate,
    pub land_under_cultivation: f64,
    pub progress_to_harvest: f64,
    pub projected_yield: f64,
    pub last_harvest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageSnapshot {
    pub x: u32,
    pub y: u32,
    pub terrain: Terrain,
    pub females: u64,
    pub males: u64,
    pub population: u64,
    pub stocks: BTreeMap<ResourceKind, StockSnapshot>,
    pub crops: Vec<CropSnapshot>,
    pub weather: Option<WeatherSample>,
    pub food: FoodDraw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub scenario: String,
    pub date: NaiveDate,
    pub days_elapsed: i64,
    pub total_population: u64,
    pub villages: Vec<VillageSnapshot>,
}

/// Everything that changes between steps. The map is shared, never mutated.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub scenario: String,
    pub clock: Clock,
    pub map: Arc<Map>,
    pub villages: Vec<Village>,
}

impl SimulationState {
    pub fn total_population(&self) -> u64 {
        self.villages.iter().map(Village::population).sum()
    }

    pub fn village_at(&self, x: u32, y: u32) -> Option<&Village> {
        self.villages.iter().find(|v| v.x == x && v.y == y)
    }

    /// Read-only projection for observers and snapshot files.
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            scenario: self.scenario.clone(),
            date: self.clock.current(),
            days_elapsed: self.clock.days_elapsed(),
            total_population: self.total_population(),
            villages: self.villages.iter().map(Village::snapshot).collect(),
        }
    }
}
