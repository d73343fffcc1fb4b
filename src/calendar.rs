//! Shared timeline and seasonal forcing.

use std::f64::consts::TAU;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

pub const DAYS_PER_YEAR: f64 = 365.0;

/// A recurring calendar date (month + day), e.g. a sowing date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    /// February 29 is rejected: annual events must exist every year.
    pub fn validate(&self) -> SimResult<()> {
        NaiveDate::from_ymd_opt(2001, self.month, self.day)
            .map(|_| ())
            .ok_or_else(|| {
                SimError::config(format!(
                    "invalid annual date {:02}-{:02}",
                    self.month, self.day
                ))
            })
    }

    pub fn in_year(&self, year: i32) -> SimResult<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day).ok_or_else(|| {
            SimError::config(format!(
                "annual date {:02}-{:02} does not exist in {year}",
                self.month, self.day
            ))
        })
    }

    pub fn next_on_or_after(&self, date: NaiveDate) -> SimResult<NaiveDate> {
        let candidate = self.in_year(date.year())?;
        if candidate >= date {
            Ok(candidate)
        } else {
            self.in_year(date.year() + 1)
        }
    }

    pub fn next_after(&self, date: NaiveDate) -> SimResult<NaiveDate> {
        self.next_on_or_after(date + Duration::days(1))
    }

    pub fn last_on_or_before(&self, date: NaiveDate) -> SimResult<NaiveDate> {
        let candidate = self.in_year(date.year())?;
        if candidate <= date {
            Ok(candidate)
        } else {
            self.in_year(date.year() - 1)
        }
    }
}

/// Sinusoid over the year with its minimum (`-amplitude`) on `min_date`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonalFunction {
    pub amplitude: f64,
    pub min_date: MonthDay,
    #[serde(default = "default_period")]
    pub period_days: f64,
}

fn default_period() -> f64 {
    DAYS_PER_YEAR
}

impl SeasonalFunction {
    pub fn new(amplitude: f64, min_date: MonthDay) -> Self {
        Self {
            amplitude,
            min_date,
            period_days: DAYS_PER_YEAR,
        }
    }

    /// Measured from the nearest `min_date`, so leap years do not skew the
    /// curve on either side of its minimum.
    fn phase(&self, date: NaiveDate) -> SimResult<f64> {
        let mut nearest: Option<i64> = None;
        for year in [date.year() - 1, date.year(), date.year() + 1] {
            let offset = (date - self.min_date.in_year(year)?).num_days();
            if nearest.map_or(true, |best| offset.abs() < best.abs()) {
                nearest = Some(offset);
            }
        }
        Ok(TAU * nearest.unwrap_or(0) as f64 / self.period_days)
    }

    /// Additive modifier in `[-amplitude, amplitude]`.
    pub fn value(&self, date: NaiveDate) -> SimResult<f64> {
        Ok(-self.amplitude * self.phase(date)?.cos())
    }

    /// Same curve mapped into `[lo, hi]`, `lo` on `min_date`.
    pub fn bounded(&self, date: NaiveDate, lo: f64, hi: f64) -> SimResult<f64> {
        let unit = (1.0 - self.phase(date)?.cos()) / 2.0;
        Ok(lo + (hi - lo) * unit)
    }
}

/// Day-indexed clock. Only the engine advances it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    start: NaiveDate,
    end: NaiveDate,
    current: NaiveDate,
    step_days: u32,
}

impl Clock {
    pub fn new(start: NaiveDate, end: NaiveDate, step_days: u32) -> SimResult<Self> {
        if step_days == 0 {
            return Err(SimError::config("time.step_size must be at least one day"));
        }
        if end <= start {
            return Err(SimError::config(format!(
                "time.end ({end}) must be after time.start ({start})"
            )));
        }
        Ok(Self {
            start,
            end,
            current: start,
            step_days,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn current(&self) -> NaiveDate {
        self.current
    }

    pub fn step_days(&self) -> u32 {
        self.step_days
    }

    /// Length of the next step; shorter than `step_days` only for the last one.
    pub fn current_step_days(&self) -> u32 {
        let remaining = (self.end - self.current).num_days().max(0);
        u32::try_from(remaining)
            .unwrap_or(u32::MAX)
            .min(self.step_days)
    }

    pub fn day_of_year(&self) -> u32 {
        self.current.ordinal()
    }

    /// Absolute day number used to key random draws.
    pub fn day_index(&self) -> i64 {
        i64::from(self.current.num_days_from_ce())
    }

    pub fn days_elapsed(&self) -> i64 {
        (self.current - self.start).num_days()
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.end
    }

    /// Moves forward `days`, never past `end`, so the final step lands
    /// exactly on `end`.
    pub(crate) fn advance_by(&mut self, days: u32) {
        let next = self.current + Duration::days(i64::from(days));
        self.current = next.min(self.end);
    }
}
