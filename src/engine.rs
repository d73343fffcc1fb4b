use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    calendar::{Clock, DAYS_PER_YEAR},
    components::{CropKind, ResourceKind},
    error::{SimError, SimResult},
    rng::{KeyColumns, RandomStream, StreamKey},
    scenario::Scenario,
    systems::{
        CropSystem, DemographicsSystem, FoodSystem, RegionalWeather, ResourceSystem,
        WeatherEngine, WeatherSystem,
    },
    world::{SimulationState, Village},
};

/// Read-only inputs shared by every village during one step.
pub struct StepContext<'a> {
    pub date: NaiveDate,
    /// Absolute day number keying this step's random draws.
    pub day: i64,
    pub step_days: u32,
    pub stream: &'a RandomStream,
    pub key_columns: KeyColumns,
    pub weather: &'a RegionalWeather,
}

impl StepContext<'_> {
    pub fn years(&self) -> f64 {
        f64::from(self.step_days) / DAYS_PER_YEAR
    }

    pub fn village_key(&self, component: &str, village: &Village) -> StreamKey {
        StreamKey::new(component).with_tile(&self.key_columns, village.x, village.y)
    }
}

/// One stage of the per-village pipeline. Systems never see other villages.
pub trait VillageSystem: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()>;
}

impl<T: VillageSystem + ?Sized> VillageSystem for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        (**self).run(ctx, village)
    }
}

#[derive(Clone, Debug, Default)]
pub struct EngineSettings {
    /// Step villages on the rayon pool.
    pub parallel: bool,
}

/// Raised from any thread; the engine stops after the current step.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct EngineBuilder {
    scenario: Scenario,
    settings: EngineSettings,
    weather: Arc<WeatherEngine>,
    crops: Arc<CropSystem>,
    resources: Arc<ResourceSystem>,
    demographics: Arc<DemographicsSystem>,
    systems: Vec<Box<dyn VillageSystem>>,
}

impl EngineBuilder {
    /// Builder with no systems in the pipeline yet.
    pub fn new(scenario: Scenario) -> SimResult<Self> {
        scenario.validate()?;
        let weather = Arc::new(WeatherEngine::new(scenario.weather.clone())?);
        let crops = Arc::new(CropSystem::new(
            scenario.wheat.clone(),
            scenario.randomness.validate_interpolation,
        )?);
        let resources = Arc::new(ResourceSystem::from_scenario(&scenario));
        let demographics = Arc::new(DemographicsSystem::new(
            scenario.demographics.clone(),
            CropKind::Wheat,
            scenario.wheat.harvest_date,
        )?);
        Ok(Self {
            scenario,
            settings: EngineSettings::default(),
            weather,
            crops,
            resources,
            demographics,
            systems: Vec::new(),
        })
    }

    /// Builder with the standard weather, crop, resource, food and
    /// demographics pipeline, in that order.
    pub fn from_scenario(scenario: Scenario) -> SimResult<Self> {
        let mut builder = Self::new(scenario)?;
        let wheat_ration = builder.scenario.resource(ResourceKind::Wheat).annual_per_capita_consumption.loc;
        builder.push_system(WeatherSystem::new(builder.weather.clone()));
        builder.push_system(builder.crops.clone());
        builder.push_system(builder.resources.clone());
        builder.push_system(FoodSystem::new(CropKind::Wheat, wheat_ration));
        builder.push_system(builder.demographics.clone());
        Ok(builder)
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.settings.parallel = parallel;
        self
    }

    pub fn with_system(mut self, system: impl VillageSystem + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl VillageSystem + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn build(self) -> SimResult<Engine> {
        Ok(Engine {
            stream: RandomStream::new(self.scenario.randomness.random_seed),
            key_columns: self.scenario.randomness.key_columns()?,
            scenario: self.scenario,
            settings: self.settings,
            weather: self.weather,
            crops: self.crops,
            resources: self.resources,
            demographics: self.demographics,
            systems: self.systems,
            stop: StopHandle::default(),
        })
    }
}

pub struct Engine {
    scenario: Scenario,
    settings: EngineSettings,
    stream: RandomStream,
    key_columns: KeyColumns,
    weather: Arc<WeatherEngine>,
    crops: Arc<CropSystem>,
    resources: Arc<ResourceSystem>,
    demographics: Arc<DemographicsSystem>,
    systems: Vec<Box<dyn VillageSystem>>,
    stop: StopHandle,
}

impl Engine {
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn weather(&self) -> &WeatherEngine {
        &self.weather
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Generates the map and founds a village on every settled tile.
    pub fn initialize(&self) -> SimResult<SimulationState> {
        let time = &self.scenario.time;
        let clock = Clock::new(time.start, time.end, time.step_size)?;
        let map = self
            .scenario
            .map
            .generator(self.key_columns)?
            .generate(self.scenario.map.width, self.scenario.map.height, self.stream.seed())?;

        let day = clock.day_index();
        let mut villages = Vec::new();
        for tile in map.village_tiles() {
            let key = StreamKey::new("village").with_tile(&self.key_columns, tile.x, tile.y);
            let (females, males) =
                self.demographics
                    .initial_split(&self.stream, day, key, self.scenario.population.size)?;
            let mut village = Village::new(tile, females, males);
            self.resources
                .stock_village(&self.stream, day, key.with("resources"), &mut village)?;
            let crop = self.crops.initial_state(clock.start(), &village)?;
            village.crops.insert(crop.kind, crop);
            villages.push(village);
        }

        info!(
            scenario = %self.scenario.name,
            villages = villages.len(),
            start = %clock.start(),
            end = %clock.end(),
            "initialized simulation"
        );
        Ok(SimulationState {
            scenario: self.scenario.name.clone(),
            clock,
            map: Arc::new(map),
            villages,
        })
    }

    /// Advances one step. `state` is left untouched; on error the caller
    /// keeps it as the last good state.
    pub fn step(&self, state: &SimulationState) -> SimResult<SimulationState> {
        self.step_at_most(state, u32::MAX)
    }

    /// One step of at most `max_days`, so a run can land on an exact day count.
    fn step_at_most(&self, state: &SimulationState, max_days: u32) -> SimResult<SimulationState> {
        if state.clock.is_finished() {
            debug!(date = %state.clock.current(), "clock already at end date");
            return Ok(state.clone());
        }
        let mut next = state.clone();
        let date = next.clock.current();
        let day = next.clock.day_index();
        let step_days = next.clock.current_step_days().min(max_days).max(1);
        let regional = self.weather.regional(&self.stream, date, day)?;
        let ctx = StepContext {
            date,
            day,
            step_days,
            stream: &self.stream,
            key_columns: self.key_columns,
            weather: &regional,
        };

        let run_village = |village: &mut Village| -> SimResult<()> {
            for stock in village.stocks.values_mut() {
                stock.begin_step();
            }
            for system in &self.systems {
                system.run(&ctx, village)?;
            }
            match village.violation() {
                Some(detail) => Err(SimError::StateCorruption {
                    x: village.x,
                    y: village.y,
                    detail,
                }),
                None => Ok(()),
            }
        };
        if self.settings.parallel {
            next.villages.par_iter_mut().try_for_each(run_village)?;
        } else {
            next.villages.iter_mut().try_for_each(run_village)?;
        }

        next.clock.advance_by(step_days);
        debug!(
            date = %date,
            temperature = regional.global_temperature,
            rainfall = regional.global_rainfall,
            population = next.total_population(),
            "step complete"
        );
        Ok(next)
    }

    /// Steps until `n_days` have passed or the end date is reached. A step
    /// that would overshoot `n_days` is shortened.
    pub fn run(&self, state: &SimulationState, n_days: u32) -> SimResult<SimulationState> {
        self.run_with_hook(state, n_days, |_| Ok::<(), SimError>(()))
    }

    pub fn run_to_end(&self, state: &SimulationState) -> SimResult<SimulationState> {
        self.run(state, u32::MAX)
    }

    /// Like [`Engine::run`], calling `hook` with the new state after every
    /// step. A hook error stops the run.
    pub fn run_with_hook<E, F>(&self, state: &SimulationState, n_days: u32, mut hook: F) -> Result<SimulationState, E>
    where
        E: From<SimError>,
        F: FnMut(&SimulationState) -> Result<(), E>,
    {
        let target = state.clock.days_elapsed().saturating_add(i64::from(n_days));
        let mut current = state.clone();
        let mut steps = 0u64;
        while !current.clock.is_finished() && current.clock.days_elapsed() < target {
            if self.stop.is_stopped() {
                warn!(date = %current.clock.current(), "stop requested, halting after last step");
                break;
            }
            let remaining =
                u32::try_from(target - current.clock.days_elapsed()).unwrap_or(u32::MAX);
            current = self.step_at_most(&current, remaining)?;
            steps += 1;
            hook(&current)?;
        }
        info!(
            steps,
            date = %current.clock.current(),
            population = current.total_population(),
            "run finished"
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = include_str!("../scenarios/highland_valley.yaml");

    fn engine() -> Engine {
        let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
        EngineBuilder::from_scenario(scenario).unwrap().build().unwrap()
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            engine().system_names(),
            vec!["weather", "farming", "resources", "food", "demographics"]
        );
    }

    #[test]
    fn test_step_leaves_input_untouched() {
        let engine = engine();
        let state = engine.initialize().unwrap();
        let before = state.snapshot();
        let next = engine.step(&state).unwrap();
        assert_eq!(state.snapshot(), before);
        assert_eq!(next.clock.days_elapsed(), 1);
    }

    #[test]
    fn test_stop_handle_halts_run() {
        let engine = engine();
        let state = engine.initialize().unwrap();
        engine.stop_handle().stop();
        let after = engine.run(&state, 30).unwrap();
        assert_eq!(after.clock.days_elapsed(), 0);
    }

    #[test]
    fn test_run_counts_days() {
        let engine = engine();
        let state = engine.initialize().unwrap();
        let after = engine.run(&state, 10).unwrap();
        assert_eq!(after.clock.days_elapsed(), 10);
    }

    #[test]
    fn test_run_shortens_last_step_to_day_count() {
        let mut scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
        scenario.time.step_size = 4;
        let engine = EngineBuilder::from_scenario(scenario).unwrap().build().unwrap();
        let state = engine.initialize().unwrap();
        let after = engine.run(&state, 10).unwrap();
        assert_eq!(after.clock.days_elapsed(), 10);
        let next = engine.step(&after).unwrap();
        assert_eq!(next.clock.days_elapsed(), 14);
    }
}
