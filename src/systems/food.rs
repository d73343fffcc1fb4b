use crate::calendar::DAYS_PER_YEAR;
use crate::components::{CropKind, FoodDraw, ResourceKind};
use crate::engine::{StepContext, VillageSystem};
use crate::error::{SimError, SimResult};
use crate::world::Village;

/// How much food a village eats this step.
///
/// Eating is capped by what is stored, by the natural demand of the
/// population and by the pace that makes stores last until the next harvest.
/// On harvest day (`days_to_harvest == 0`) the pace cap is lifted.
pub fn ration(
    available: f64,
    natural_rate: f64,
    population: f64,
    days_to_harvest: i64,
    step_days: u32,
) -> FoodDraw {
    let available = available.max(0.0);
    let natural_demand = (natural_rate * population).max(0.0);
    let pace = if days_to_harvest <= 0 {
        available
    } else {
        available * f64::from(step_days) / days_to_harvest as f64
    };
    let consumed = available.min(natural_demand).min(pace);
    let adequacy = if natural_demand > 0.0 {
        consumed / natural_demand
    } else {
        1.0
    };
    FoodDraw {
        available,
        natural_demand,
        consumed,
        adequacy,
    }
}

pub struct FoodSystem {
    crop: CropKind,
    annual_per_capita: f64,
}

impl FoodSystem {
    pub fn new(crop: CropKind, annual_per_capita: f64) -> Self {
        Self {
            crop,
            annual_per_capita,
        }
    }
}

impl VillageSystem for FoodSystem {
    fn name(&self) -> &str {
        "food"
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        let corruption = |detail: String| SimError::StateCorruption {
            x: village.x,
            y: village.y,
            detail,
        };
        let days_to_harvest = village
            .crop(self.crop)
            .map(|crop| crop.days_to_harvest(ctx.date))
            .ok_or_else(|| corruption(format!("missing {} crop state", self.crop.name())))?;
        let produce: ResourceKind = self.crop.produce();
        let available = village
            .stock(produce)
            .map(|stock| stock.stored)
            .ok_or_else(|| corruption(format!("missing {} stock", produce.name())))?;

        let natural_rate = self.annual_per_capita * f64::from(ctx.step_days) / DAYS_PER_YEAR;
        let draw = ration(
            available,
            natural_rate,
            village.population() as f64,
            days_to_harvest,
            ctx.step_days,
        );
        if let Some(stock) = village.stock_mut(produce) {
            stock.consume(draw.consumed);
        }
        village.food = draw;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pace_cap_binds() {
        let draw = ration(100.0, 2.0, 40.0, 10, 1);
        assert_eq!(draw.consumed, 10.0);
        assert_eq!(draw.natural_demand, 80.0);
        assert_eq!(draw.adequacy, 0.125);
    }

    #[test]
    fn test_harvest_day_lifts_pace_cap() {
        let draw = ration(100.0, 2.0, 40.0, 0, 1);
        assert_eq!(draw.consumed, 80.0);
        assert_eq!(draw.adequacy, 1.0);
    }

    #[test]
    fn test_never_eats_more_than_stored() {
        for available in [0.0, 0.5, 3.0, 1e6] {
            for days in [0, 1, 30, 365] {
                let draw = ration(available, 0.4, 64.0, days, 1);
                assert!(draw.consumed <= available);
                assert!(draw.adequacy >= 0.0 && draw.adequacy <= 1.0);
            }
        }
    }

    #[test]
    fn test_empty_village_is_adequately_fed() {
        let draw = ration(10.0, 0.4, 0.0, 30, 1);
        assert_eq!(draw.consumed, 0.0);
        assert_eq!(draw.adequacy, 1.0);
    }
}
