//! Intraday bar widths supported by the upstream kline endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bar bucket width in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    M60,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported timeframe {0} minutes (expected 1, 5, 15, 30 or 60)")]
pub struct TimeframeError(pub u32);

impl Timeframe {
    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::M60 => 60,
        }
    }

    pub fn from_minutes(minutes: u32) -> Result<Self, TimeframeError> {
        match minutes {
            1 => Ok(Timeframe::M1),
            5 => Ok(Timeframe::M5),
            15 => Ok(Timeframe::M15),
            30 => Ok(Timeframe::M30),
            60 => Ok(Timeframe::M60),
            other => Err(TimeframeError(other)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}min", self.minutes())
    }
}

impl TryFrom<u32> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(value)
    }
}

impl From<Timeframe> for u32 {
    fn from(tf: Timeframe) -> Self {
        tf.minutes()
    }
}
