//! Wheat lifecycle: Dormant -> Growing -> Harvested -> Dormant.
//!
//! A step covers the dates `[t, t + step)`. A crop sows or harvests when its
//! date falls inside that window.

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::calendar::MonthDay;
use crate::components::{CropKind, CropPhase, CropState};
use crate::config::CropConfig;
use crate::engine::{StepContext, VillageSystem};
use crate::error::{SimError, SimResult};
use crate::world::Village;

/// Yield multiplier from rainfall over the growth windows, applied at harvest.
pub trait RainfallEffect: Send + Sync {
    fn yield_factor(&self, crop: &CropState) -> f64;
}

/// No rainfall effect until one is calibrated.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeutralRainfall;

impl RainfallEffect for NeutralRainfall {
    fn yield_factor(&self, _crop: &CropState) -> f64 {
        1.0
    }
}

/// Piecewise-linear daily yield factor keyed by temperature deviation.
#[derive(Clone, Debug, PartialEq)]
pub struct TemperatureResponse {
    points: Vec<(f64, f64)>,
    strict: bool,
}

impl TemperatureResponse {
    /// With `strict`, deviations outside the table are errors instead of
    /// being clamped to the nearest end.
    pub fn new(table: &[[f64; 2]], strict: bool) -> SimResult<Self> {
        if table.is_empty() {
            return Err(SimError::config("wheat.temperature_response must not be empty"));
        }
        let points: Vec<(f64, f64)> = table.iter().map(|[x, y]| (*x, *y)).collect();
        for pair in points.windows(2) {
            if !(pair[0].0 < pair[1].0) {
                return Err(SimError::config(
                    "wheat.temperature_response deviations must be strictly increasing",
                ));
            }
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite() || *y <= 0.0) {
            return Err(SimError::config(
                "wheat.temperature_response factors must be finite and positive",
            ));
        }
        Ok(Self { points, strict })
    }

    pub fn factor(&self, deviation: f64) -> SimResult<f64> {
        let (lo_x, lo_y) = self.points[0];
        let (hi_x, hi_y) = self.points[self.points.len() - 1];
        if deviation < lo_x || deviation > hi_x {
            if self.strict {
                return Err(SimError::config(format!(
                    "temperature deviation {deviation:.2} outside interpolation range [{lo_x}, {hi_x}]"
                )));
            }
            return Ok(if deviation < lo_x { lo_y } else { hi_y });
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if deviation <= x1 {
                let t = (deviation - x0) / (x1 - x0);
                return Ok(y0 + t * (y1 - y0));
            }
        }
        Ok(hi_y)
    }
}

pub struct CropSystem {
    kind: CropKind,
    config: CropConfig,
    response: TemperatureResponse,
    rainfall: Box<dyn RainfallEffect>,
}

impl CropSystem {
    pub fn new(config: CropConfig, validate_interpolation: bool) -> SimResult<Self> {
        config.validate()?;
        let response = TemperatureResponse::new(&config.temperature_response, validate_interpolation)?;
        Ok(Self {
            kind: CropKind::Wheat,
            config,
            response,
            rainfall: Box::new(NeutralRainfall),
        })
    }

    pub fn with_rainfall_effect(mut self, effect: impl RainfallEffect + 'static) -> Self {
        self.rainfall = Box::new(effect);
        self
    }

    /// Crop state for a village whose simulation starts on `start`. A start
    /// inside a growing season finds the field already planted.
    pub fn initial_state(&self, start: NaiveDate, village: &Village) -> SimResult<CropState> {
        let last_sow = self.config.sowing_date.last_on_or_before(start)?;
        let its_harvest = self.config.harvest_date.next_after(last_sow)?;
        if last_sow < start && start < its_harvest {
            let mut crop = CropState::new(self.kind, last_sow, its_harvest)?;
            self.sow(&mut crop, village);
            crop.progress_to_harvest = progress(&crop, start);
            return Ok(crop);
        }
        let (sow, harvest) = cycle_from(self.config.sowing_date, self.config.harvest_date, start)?;
        CropState::new(self.kind, sow, harvest)
    }

    fn sow(&self, crop: &mut CropState, village: &Village) {
        let demand = village.population() as f64 * self.config.land_per_capita;
        crop.reset_growth();
        crop.phase = CropPhase::Growing;
        crop.land_under_cultivation = demand.min(village.arable_land).max(0.0);
        crop.projected_yield = self.config.baseline_yield_per_land * crop.land_under_cultivation;
        crop.previous_day_dry = false;
    }

    fn grow(&self, ctx: &StepContext<'_>, crop: &mut CropState, village: &Village) -> SimResult<()> {
        let Some(weather) = village.weather else {
            return Ok(());
        };
        let deviation = weather.temperature - self.config.equilibrium_temperature;
        let daily = self.response.factor(deviation)?;
        crop.projected_yield *= daily.powi(ctx.step_days as i32);

        let days_before_harvest = (crop.harvest_date - ctx.date).num_days();
        let rain = weather.rainfall * f64::from(ctx.step_days);
        if days_before_harvest < self.config.late_window_days {
            crop.rainfall_late_growth += rain;
        } else if days_before_harvest < self.config.mid_window_days {
            crop.rainfall_mid_growth += rain;
        }

        let dry = weather.rainfall == 0.0;
        if dry && crop.previous_day_dry {
            crop.cumulative_dry_days += ctx.step_days;
        }
        crop.previous_day_dry = dry;
        crop.progress_to_harvest = progress(crop, ctx.date);
        Ok(())
    }

    fn harvest(&self, ctx: &StepContext<'_>, crop: &mut CropState, village: &mut Village) -> SimResult<()> {
        let amount = (crop.projected_yield * self.rainfall.yield_factor(crop)).max(0.0);
        let produce = crop.kind.produce();
        let (x, y) = (village.x, village.y);
        let stock = village.stock_mut(produce).ok_or_else(|| SimError::StateCorruption {
            x,
            y,
            detail: format!("missing {} stock for harvest", produce.name()),
        })?;
        stock.deposit(amount);
        crop.record_harvest(amount);
        crop.progress_to_harvest = 1.0;
        crop.phase = CropPhase::Harvested;
        info!(
            x,
            y,
            date = %ctx.date,
            crop = crop.kind.name(),
            amount,
            "harvest"
        );
        Ok(())
    }
}

impl VillageSystem for CropSystem {
    fn name(&self) -> &str {
        "farming"
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        let Some(mut crop) = village.crops.remove(&self.kind) else {
            return Err(SimError::StateCorruption {
                x: village.x,
                y: village.y,
                detail: format!("missing {} crop state", self.kind.name()),
            });
        };
        let result = self.advance(ctx, &mut crop, village);
        village.crops.insert(self.kind, crop);
        result
    }
}

impl CropSystem {
    fn advance(&self, ctx: &StepContext<'_>, crop: &mut CropState, village: &mut Village) -> SimResult<()> {
        let window_end = ctx.date + Duration::days(i64::from(ctx.step_days));

        if crop.phase == CropPhase::Harvested {
            // The next sowing may already have fallen inside the harvest step.
            let after_harvest = crop.harvest_date + Duration::days(1);
            let (sow, harvest) =
                cycle_from(self.config.sowing_date, self.config.harvest_date, after_harvest)?;
            crop.reset_growth();
            crop.reschedule(sow, harvest)?;
            debug!(x = village.x, y = village.y, next_sow = %sow, "field lies fallow");
        }

        if crop.phase == CropPhase::Dormant {
            if crop.sow_date >= window_end {
                return Ok(());
            }
            self.sow(crop, village);
            debug!(
                x = village.x,
                y = village.y,
                land = crop.land_under_cultivation,
                "sowing"
            );
        }

        if crop.harvest_date < window_end {
            return self.harvest(ctx, crop, village);
        }
        self.grow(ctx, crop, village)
    }
}

/// Next (sow, harvest) pair whose sowing is on or after `date`.
fn cycle_from(sowing: MonthDay, harvest: MonthDay, date: NaiveDate) -> SimResult<(NaiveDate, NaiveDate)> {
    let sow = sowing.next_on_or_after(date)?;
    Ok((sow, harvest.next_after(sow)?))
}

fn progress(crop: &CropState, date: NaiveDate) -> f64 {
    let total = crop.growing_days() as f64;
    let elapsed = (date - crop.sow_date).num_days() as f64;
    (elapsed / total).clamp(0.0, 1.0)
}
