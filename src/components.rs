use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Degrees Fahrenheit.
    pub temperature: f64,
    /// Millimetres per day, never negative.
    pub rainfall: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wheat,
    Wood,
    Stone,
    Bronze,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Wheat,
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Bronze,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Wheat => "wheat",
            ResourceKind::Wood => "wood",
            ResourceKind::Stone => "stone",
            ResourceKind::Bronze => "bronze",
        }
    }

    /// Food is grown, not extracted, and eaten through the food model.
    pub fn is_food(self) -> bool {
        matches!(self, ResourceKind::Wheat)
    }
}

/// What moved through a stock during the last step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceFlow {
    pub extracted: f64,
    pub consumed: f64,
    pub regenerated: f64,
    pub deposited: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceStock {
    pub kind: ResourceKind,
    /// In the ground, not yet extracted.
    pub potential: f64,
    /// Extracted and banked.
    pub stored: f64,
    pub last_flow: ResourceFlow,
}

impl ResourceStock {
    pub fn new(kind: ResourceKind, potential: f64, stored: f64) -> Self {
        Self {
            kind,
            potential,
            stored,
            last_flow: ResourceFlow::default(),
        }
    }

    pub fn begin_step(&mut self) {
        self.last_flow = ResourceFlow::default();
    }

    /// Moves up to `capacity` from potential into stores.
    pub fn extract(&mut self, capacity: f64) -> f64 {
        let extracted = capacity.max(0.0).min(self.potential);
        self.potential -= extracted;
        self.stored += extracted;
        self.last_flow.extracted += extracted;
        extracted
    }

    /// Removes up to `demand` from stores.
    pub fn consume(&mut self, demand: f64) -> f64 {
        let consumed = demand.max(0.0).min(self.stored);
        self.stored -= consumed;
        self.last_flow.consumed += consumed;
        consumed
    }

    pub fn regenerate(&mut self, amount: f64, ceiling: f64) -> f64 {
        let room = (ceiling - self.potential).max(0.0);
        let regenerated = amount.max(0.0).min(room);
        self.potential += regenerated;
        self.last_flow.regenerated += regenerated;
        regenerated
    }

    /// Adds produce that did not come out of `potential` (a harvest).
    pub fn deposit(&mut self, amount: f64) {
        let amount = amount.max(0.0);
        self.stored += amount;
        self.last_flow.deposited += amount;
    }

    pub fn violation(&self) -> Option<String> {
        if !(self.stored.is_finite() && self.stored >= 0.0) {
            return Some(format!("{} stored is {}", self.kind.name(), self.stored));
        }
        if !(self.potential.is_finite() && self.potential >= 0.0) {
            return Some(format!("{} potential is {}", self.kind.name(), self.potential));
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropKind {
    Wheat,
}

impl CropKind {
    pub fn name(self) -> &'static str {
        match self {
            CropKind::Wheat => "wheat",
        }
    }

    pub fn produce(self) -> ResourceKind {
        match self {
            CropKind::Wheat => ResourceKind::Wheat,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPhase {
    Dormant,
    Growing,
    Harvested,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropState {
    pub kind: CropKind,
    pub phase: CropPhase,
    pub sow_date: NaiveDate,
    pub harvest_date: NaiveDate,
    pub land_under_cultivation: f64,
    pub progress_to_harvest: f64,
    pub projected_yield: f64,
    pub rainfall_mid_growth: f64,
    pub rainfall_late_growth: f64,
    pub cumulative_dry_days: u32,
    pub previous_day_dry: bool,
    pub last_harvest: Option<f64>,
    pub previous_harvest: Option<f64>,
}

impl CropState {
    pub fn new(kind: CropKind, sow_date: NaiveDate, harvest_date: NaiveDate) -> SimResult<Self> {
        check_schedule(sow_date, harvest_date)?;
        Ok(Self {
            kind,
            phase: CropPhase::Dormant,
            sow_date,
            harvest_date,
            land_under_cultivation: 0.0,
            progress_to_harvest: 0.0,
            projected_yield: 0.0,
            rainfall_mid_growth: 0.0,
            rainfall_late_growth: 0.0,
            cumulative_dry_days: 0,
            previous_day_dry: false,
            last_harvest: None,
            previous_harvest: None,
        })
    }

    pub fn growing_days(&self) -> i64 {
        (self.harvest_date - self.sow_date).num_days()
    }

    /// Whole days from `today` to this cycle's harvest, 0 on harvest day.
    pub fn days_to_harvest(&self, today: NaiveDate) -> i64 {
        (self.harvest_date - today).num_days().max(0)
    }

    /// Replaces the cycle dates, keeping harvest history.
    pub fn reschedule(&mut self, sow_date: NaiveDate, harvest_date: NaiveDate) -> SimResult<()> {
        check_schedule(sow_date, harvest_date)?;
        self.sow_date = sow_date;
        self.harvest_date = harvest_date;
        Ok(())
    }

    pub fn record_harvest(&mut self, amount: f64) {
        self.previous_harvest = self.last_harvest;
        self.last_harvest = Some(amount);
    }

    pub fn reset_growth(&mut self) {
        self.phase = CropPhase::Dormant;
        self.land_under_cultivation = 0.0;
        self.progress_to_harvest = 0.0;
        self.projected_yield = 0.0;
        self.rainfall_mid_growth = 0.0;
        self.rainfall_late_growth = 0.0;
        self.cumulative_dry_days = 0;
    }
}

fn check_schedule(sow: NaiveDate, harvest: NaiveDate) -> SimResult<()> {
    if harvest <= sow {
        return Err(SimError::InvalidSchedule { sow, harvest });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn name(self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    pub sex: Sex,
    pub population: u64,
    /// Annual rate applied during the last step.
    pub mortality_rate: f64,
    /// Annual rate applied during the last step; always 0 for males.
    pub fertility_rate: f64,
}

impl Compartment {
    pub fn new(sex: Sex, population: u64) -> Self {
        Self {
            sex,
            population,
            mortality_rate: 0.0,
            fertility_rate: 0.0,
        }
    }
}

/// Outcome of the day's food draw.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodDraw {
    pub available: f64,
    pub natural_demand: f64,
    pub consumed: f64,
    /// consumed / natural_demand.
    pub adequacy: f64,
}

impl Default for FoodDraw {
    fn default() -> Self {
        Self {
            available: 0.0,
            natural_demand: 0.0,
            consumed: 0.0,
            adequacy: 1.0,
        }
    }
}
