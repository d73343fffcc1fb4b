//! Extraction, consumption and regeneration of raw materials.

use crate::components::{ResourceKind, ResourceStock};
use crate::config::{NormalParams, ResourceConfig};
use crate::engine::{StepContext, VillageSystem};
use crate::error::{SimError, SimResult};
use crate::map::TerrainTable;
use crate::rng::{RandomStream, StreamKey};
use crate::scenario::Scenario;
use crate::world::Village;

/// Extractable amount per tile when the scenario gives no table.
pub fn default_ceiling(kind: ResourceKind) -> TerrainTable<f64> {
    match kind {
        ResourceKind::Wheat => TerrainTable::uniform(0.0),
        ResourceKind::Wood => TerrainTable {
            forest: 5000.0,
            high_mountain: 300.0,
            desert: 50.0,
            sea: 0.0,
            grassland: 800.0,
        },
        ResourceKind::Stone => TerrainTable {
            forest: 1000.0,
            high_mountain: 8000.0,
            desert: 2000.0,
            sea: 0.0,
            grassland: 1000.0,
        },
        ResourceKind::Bronze => TerrainTable {
            forest: 100.0,
            high_mountain: 1500.0,
            desert: 300.0,
            sea: 0.0,
            grassland: 100.0,
        },
    }
}

/// Fraction of the ceiling regrown per year when the scenario gives none.
pub fn default_regeneration(kind: ResourceKind) -> f64 {
    match kind {
        ResourceKind::Wood => 0.05,
        ResourceKind::Wheat | ResourceKind::Stone | ResourceKind::Bronze => 0.0,
    }
}

#[derive(Clone, Debug)]
pub struct ResourceModel {
    pub kind: ResourceKind,
    pub initial_stores: NormalParams,
    pub consumption: NormalParams,
    pub accumulation: NormalParams,
    pub ceiling: TerrainTable<f64>,
    pub annual_regeneration: f64,
}

impl ResourceModel {
    pub fn from_config(kind: ResourceKind, config: &ResourceConfig) -> Self {
        Self {
            kind,
            initial_stores: config.initial_per_capita_stores,
            consumption: config.annual_per_capita_consumption,
            accumulation: config.annual_per_capita_accumulation,
            ceiling: config.potential.unwrap_or_else(|| default_ceiling(kind)),
            annual_regeneration: config
                .annual_regeneration
                .unwrap_or_else(|| default_regeneration(kind)),
        }
    }

    pub fn is_renewable(&self) -> bool {
        self.annual_regeneration > 0.0
    }

    /// Per-capita annual rate drawn for this step, floored at zero.
    fn rate(&self, stream: &RandomStream, key: StreamKey, day: i64, params: NormalParams) -> SimResult<f64> {
        Ok(stream.normal(key, day, params.loc, params.scale)?.max(0.0))
    }

    fn step(&self, ctx: &StepContext<'_>, key: StreamKey, population: f64, village: &mut Village) -> SimResult<()> {
        let years = ctx.years();
        let capacity = self.rate(ctx.stream, key.with("accumulation"), ctx.day, self.accumulation)?
            * population
            * years;
        let demand =
            self.rate(ctx.stream, key.with("consumption"), ctx.day, self.consumption)? * population * years;
        let ceiling = self.ceiling.get(village.terrain);
        let (x, y) = (village.x, village.y);

        let stock = village.stock_mut(self.kind).ok_or_else(|| SimError::StateCorruption {
            x,
            y,
            detail: format!("missing {} stock", self.kind.name()),
        })?;
        stock.extract(capacity);
        stock.consume(demand);
        if self.is_renewable() {
            stock.regenerate(self.annual_regeneration * ceiling * years, ceiling);
        }
        Ok(())
    }
}

pub struct ResourceSystem {
    models: Vec<ResourceModel>,
}

impl ResourceSystem {
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            models: ResourceKind::ALL
                .iter()
                .map(|kind| ResourceModel::from_config(*kind, scenario.resource(*kind)))
                .collect(),
        }
    }

    pub fn model(&self, kind: ResourceKind) -> Option<&ResourceModel> {
        self.models.iter().find(|m| m.kind == kind)
    }

    /// Opening stores and in-ground potential for a new village.
    pub fn stock_village(
        &self,
        stream: &RandomStream,
        day: i64,
        key: StreamKey,
        village: &mut Village,
    ) -> SimResult<()> {
        let population = village.population() as f64;
        for model in &self.models {
            let params = model.initial_stores;
            let per_capita = stream.normal(
                key.with(model.kind.name()).with("initial_stores"),
                day,
                params.loc,
                params.scale,
            )?;
            let stored = (per_capita * population).max(0.0);
            let potential = model.ceiling.get(village.terrain);
            village
                .stocks
                .insert(model.kind, ResourceStock::new(model.kind, potential, stored));
        }
        Ok(())
    }
}

impl VillageSystem for ResourceSystem {
    fn name(&self) -> &str {
        "resources"
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        let key = ctx.village_key("resources", village);
        let population = village.population() as f64;
        for model in self.models.iter().filter(|m| !m.kind.is_food()) {
            model.step(ctx, key.with(model.kind.name()), population, village)?;
        }
        Ok(())
    }
}
