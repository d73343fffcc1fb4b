use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by the simulation kernel. None of them are recoverable at
/// the point of detection; they propagate to whoever drives the engine.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid {distribution} parameter: {reason}")]
    InvalidParameter {
        distribution: &'static str,
        reason: String,
    },

    #[error("invalid crop schedule: harvest {harvest} is not after sowing {sow}")]
    InvalidSchedule { sow: NaiveDate, harvest: NaiveDate },

    #[error("state corruption in village ({x}, {y}): {detail}")]
    StateCorruption { x: u32, y: u32, detail: String },
}

impl SimError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::Config(message.into())
    }

    pub(crate) fn parameter(distribution: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidParameter {
            distribution,
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
