//! Female/male compartments with food-driven mortality and seasonal,
//! harvest-sensitive fertility. Head counts are whole people: deaths are
//! binomial, births Poisson.

use crate::calendar::{MonthDay, SeasonalFunction};
use crate::components::{CropKind, CropState, Sex};
use crate::config::DemographicsConfig;
use crate::engine::{StepContext, VillageSystem};
use crate::error::SimResult;
use crate::rng::{RandomStream, StreamKey};
use crate::world::Village;

pub struct DemographicsSystem {
    config: DemographicsConfig,
    crop: CropKind,
    seasonality: SeasonalFunction,
}

impl DemographicsSystem {
    /// Fertility bottoms out on the harvest date and peaks half a year later.
    pub fn new(config: DemographicsConfig, crop: CropKind, harvest_date: MonthDay) -> SimResult<Self> {
        config.validate()?;
        harvest_date.validate()?;
        let seasonality = SeasonalFunction::new(config.fertility_amplitude, harvest_date);
        Ok(Self {
            config,
            crop,
            seasonality,
        })
    }

    /// Splits the opening head count between the compartments.
    pub fn initial_split(&self, stream: &RandomStream, day: i64, key: StreamKey, size: u64) -> SimResult<(u64, u64)> {
        let females = stream.binomial(key.with("initial_split"), day, size, self.config.initial_female_share)?;
        Ok((females, size - females))
    }

    /// Annual deaths per person at the given food adequacy.
    pub fn mortality_rate(&self, adequacy: f64) -> f64 {
        self.config.mortality_rate / adequacy.max(self.config.min_adequacy)
    }

    /// Relative fertility change driven by the last two harvests.
    pub fn harvest_multiplier(&self, crop: Option<&CropState>) -> f64 {
        match crop.and_then(|c| c.last_harvest.zip(c.previous_harvest)) {
            Some((last, previous)) if previous > 0.0 => {
                let change = last / previous - 1.0;
                (1.0 + self.config.harvest_fertility_elasticity * change).max(0.0)
            }
            _ => 1.0,
        }
    }

    /// Annual births per woman on the step date.
    pub fn fertility_rate(&self, ctx: &StepContext<'_>, village: &Village) -> SimResult<f64> {
        let seasonal = 1.0 + self.seasonality.value(ctx.date)?;
        Ok(self.config.fertility_rate * seasonal * self.harvest_multiplier(village.crop(self.crop)))
    }
}

impl VillageSystem for DemographicsSystem {
    fn name(&self) -> &str {
        "demographics"
    }

    fn run(&self, ctx: &StepContext<'_>, village: &mut Village) -> SimResult<()> {
        let key = ctx.village_key("demographics", village);
        let years = ctx.years();
        let mortality = self.mortality_rate(village.food.adequacy);
        let death_probability = 1.0 - (-mortality * years).exp();
        let fertility = self.fertility_rate(ctx, village)?;

        let mothers = village.compartment(Sex::Female).population;
        let births = ctx.stream.poisson(
            key.with(Sex::Female.name()).with("births"),
            ctx.day,
            mothers as f64 * fertility * years,
        )?;

        for sex in Sex::ALL {
            let compartment = village.compartment_mut(sex);
            let deaths = ctx.stream.binomial(
                key.with(sex.name()).with("deaths"),
                ctx.day,
                compartment.population,
                death_probability,
            )?;
            compartment.population -= deaths;
            compartment.mortality_rate = mortality;
            compartment.fertility_rate = match sex {
                Sex::Female => fertility,
                Sex::Male => 0.0,
            };
        }

        if births > 0 {
            let girls = ctx.stream.binomial(
                key.with("sex_at_birth"),
                ctx.day,
                births,
                self.config.female_share_at_birth,
            )?;
            village.compartment_mut(Sex::Female).population += girls;
            village.compartment_mut(Sex::Male).population += births - girls;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::systems::testing::{context, date, regional, village};

    fn system() -> DemographicsSystem {
        DemographicsSystem::new(DemographicsConfig::default(), CropKind::Wheat, MonthDay::new(5, 15)).unwrap()
    }

    fn crop_with(last: Option<f64>, previous: Option<f64>) -> CropState {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let mut crop = CropState::new(CropKind::Wheat, date(2000, 10, 15), date(2001, 5, 15)).unwrap();
        crop.last_harvest = last;
        crop.previous_harvest = previous;
        crop
    }

    #[test]
    fn test_mortality_rises_as_adequacy_falls() {
        let system = system();
        assert!((system.mortality_rate(1.0) - 0.04).abs() < 1e-12);
        assert!((system.mortality_rate(0.5) - 0.08).abs() < 1e-12);
        assert!((system.mortality_rate(0.0) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_harvest_multiplier_follows_relative_change() {
        let system = system();
        assert_eq!(system.harvest_multiplier(None), 1.0);
        assert_eq!(system.harvest_multiplier(Some(&crop_with(Some(10.0), None))), 1.0);
        let doubled = system.harvest_multiplier(Some(&crop_with(Some(20.0), Some(10.0))));
        assert!((doubled - 1.38).abs() < 1e-12);
        let failed = system.harvest_multiplier(Some(&crop_with(Some(0.0), Some(10.0))));
        assert!((failed - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_initial_split_preserves_head_count() {
        let system = system();
        let stream = RandomStream::new(4);
        let (females, males) = system
            .initial_split(&stream, 0, StreamKey::new("demographics"), 64)
            .unwrap();
        assert_eq!(females + males, 64);
    }

    #[test]
    fn test_no_women_means_no_births() {
        let system = system();
        let stream = RandomStream::new(7);
        let today = date(2000, 11, 15);
        let weather = regional(today);
        for day in 0..50 {
            let ctx = context(today, day, 30, &stream, &weather);
            let mut village = village(0, 40);
            system.run(&ctx, &mut village).unwrap();
            assert_eq!(village.compartment(Sex::Female).population, 0);
            assert!(village.compartment(Sex::Male).population <= 40);
            assert!(village.violation().is_none());
        }
    }

    #[test]
    fn test_empty_village_stays_empty() {
        let system = system();
        let stream = RandomStream::new(7);
        let today = date(2000, 11, 15);
        let weather = regional(today);
        let ctx = context(today, 3, 1, &stream, &weather);
        let mut village = village(0, 0);
        system.run(&ctx, &mut village).unwrap();
        assert_eq!(village.population(), 0);
        assert!(village.violation().is_none());
    }

    #[test]
    fn test_starvation_kills_more() {
        let system = system();
        let stream = RandomStream::new(11);
        let today = date(2000, 11, 15);
        let weather = regional(today);
        let survivors = |adequacy: f64| -> u64 {
            (0..100)
                .map(|day| {
                    let ctx = context(today, day, 1, &stream, &weather);
                    let mut village = village(500, 500);
                    village.food.adequacy = adequacy;
                    system.run(&ctx, &mut village).unwrap();
                    village.population()
                })
                .sum()
        };
        assert!(survivors(0.0) < survivors(1.0));
    }

    #[test]
    fn test_births_split_between_compartments() {
        let config = DemographicsConfig {
            mortality_rate: 0.0,
            fertility_rate: 0.5,
            ..DemographicsConfig::default()
        };
        let system = DemographicsSystem::new(config, CropKind::Wheat, MonthDay::new(5, 15)).unwrap();
        let stream = RandomStream::new(3);
        let today = date(2000, 11, 15);
        let weather = regional(today);
        let ctx = context(today, 0, 365, &stream, &weather);
        let mut village = village(1000, 1000);
        system.run(&ctx, &mut village).unwrap();

        let girls = village.compartment(Sex::Female).population - 1000;
        let boys = village.compartment(Sex::Male).population - 1000;
        assert!(girls > 0 && boys > 0);
        let births = girls + boys;
        assert!((300..900).contains(&births), "births {births}");
        assert_eq!(village.compartment(Sex::Female).fertility_rate, system.fertility_rate(&ctx, &village).unwrap());
        assert_eq!(village.compartment(Sex::Male).fertility_rate, 0.0);
    }
}
