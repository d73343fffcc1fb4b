mod common;

use chrono::NaiveDate;
use village_sim::{
    calendar::MonthDay,
    components::{CropKind, CropPhase, ResourceKind},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn short_season() -> village_sim::Scenario {
    let mut scenario = common::fully_settled();
    scenario.time.start = date(2000, 6, 1);
    scenario.time.end = date(2000, 7, 1);
    scenario.wheat.sowing_date = MonthDay::new(6, 5);
    scenario.wheat.harvest_date = MonthDay::new(6, 20);
    scenario.wheat.late_window_days = 5;
    scenario.wheat.mid_window_days = 10;
    scenario
}

#[test]
fn progress_reaches_one_on_harvest_day_and_resets_next_day() {
    let engine = common::engine(short_season());
    let mut state = engine.initialize().unwrap();
    let mut progress = Vec::new();
    while !state.clock.is_finished() {
        let step_date = state.clock.current();
        state = engine.step(&state).unwrap();
        let crop = state.villages[0].crop(CropKind::Wheat).unwrap();
        progress.push((step_date, crop.phase, crop.progress_to_harvest));
    }

    let on = |d: NaiveDate| progress.iter().find(|(day, _, _)| *day == d).copied().unwrap();
    assert_eq!(on(date(2000, 6, 4)).1, CropPhase::Dormant);
    assert_eq!(on(date(2000, 6, 5)), (date(2000, 6, 5), CropPhase::Growing, 0.0));
    assert_eq!(on(date(2000, 6, 20)), (date(2000, 6, 20), CropPhase::Harvested, 1.0));
    assert_eq!(on(date(2000, 6, 21)), (date(2000, 6, 21), CropPhase::Dormant, 0.0));

    let growing: Vec<f64> = progress
        .iter()
        .filter(|(_, phase, _)| *phase == CropPhase::Growing)
        .map(|(_, _, p)| *p)
        .collect();
    assert_eq!(growing.len(), 15);
    assert!(growing.windows(2).all(|w| w[0] < w[1]));
    assert!(growing.iter().all(|p| *p < 1.0));
}

#[test]
fn harvest_is_deposited_into_wheat_stores() {
    let engine = common::engine(short_season());
    let start = engine.initialize().unwrap();
    let before_harvest = engine.run(&start, 19).unwrap();
    assert_eq!(before_harvest.clock.current(), date(2000, 6, 20));
    let after_harvest = engine.step(&before_harvest).unwrap();

    let mut harvested = 0;
    for (old, new) in before_harvest.villages.iter().zip(&after_harvest.villages) {
        let crop_before = old.crop(CropKind::Wheat).unwrap();
        let crop_after = new.crop(CropKind::Wheat).unwrap();
        let wheat = new.stock(ResourceKind::Wheat).unwrap();
        assert_eq!(crop_after.last_harvest, Some(crop_before.projected_yield));
        assert_eq!(wheat.last_flow.deposited, crop_before.projected_yield);
        assert!(crop_after.land_under_cultivation <= new.arable_land);
        if wheat.last_flow.deposited > 0.0 {
            harvested += 1;
        }
    }
    assert!(harvested > 0);
}

#[test]
fn next_cycle_is_scheduled_a_year_later() {
    let engine = common::engine(short_season());
    let state = engine.run_to_end(&engine.initialize().unwrap()).unwrap();
    let crop = state.villages[0].crop(CropKind::Wheat).unwrap();
    assert_eq!(crop.sow_date, date(2001, 6, 5));
    assert_eq!(crop.harvest_date, date(2001, 6, 20));
}

#[test]
fn start_inside_growing_season_finds_field_planted() {
    let mut scenario = common::fully_settled();
    scenario.time.start = date(2001, 1, 1);
    scenario.time.end = date(2001, 2, 1);
    let engine = common::engine(scenario);
    let state = engine.initialize().unwrap();
    for village in &state.villages {
        let crop = village.crop(CropKind::Wheat).unwrap();
        assert_eq!(crop.phase, CropPhase::Growing);
        assert_eq!(crop.sow_date, date(2000, 10, 15));
        assert_eq!(crop.harvest_date, date(2001, 5, 15));
        assert!(crop.progress_to_harvest > 0.3 && crop.progress_to_harvest < 0.4);
    }
}

#[test]
fn sowing_in_the_harvest_step_is_not_lost() {
    let mut scenario = common::fully_settled();
    scenario.time.start = date(2000, 6, 1);
    scenario.time.end = date(2000, 8, 1);
    scenario.time.step_size = 7;
    scenario.wheat.sowing_date = MonthDay::new(6, 21);
    scenario.wheat.harvest_date = MonthDay::new(6, 20);
    let engine = common::engine(scenario);
    let state = engine.run_to_end(&engine.initialize().unwrap()).unwrap();
    for village in &state.villages {
        let crop = village.crop(CropKind::Wheat).unwrap();
        assert_eq!(crop.phase, CropPhase::Growing);
        assert_eq!(crop.sow_date, date(2000, 6, 21));
        assert_eq!(crop.harvest_date, date(2001, 6, 20));
        assert!(crop.last_harvest.is_some());
        assert!(crop.progress_to_harvest > 0.0);
    }
}
