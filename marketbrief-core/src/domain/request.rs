//! Per-run symbol request, built from the watch-list.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::symbol::SymbolCode;
use super::timeframe::Timeframe;

/// Open-position context attached to a watch-list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub buy_date: NaiveDate,
    pub cost_price: f64,
    pub quantity: f64,
}

impl PositionInfo {
    /// Unrealized P&L at `latest_close`, as an absolute amount.
    pub fn open_pnl(&self, latest_close: f64) -> f64 {
        (latest_close - self.cost_price) * self.quantity
    }
}

/// Everything the pipeline needs to process one symbol.
///
/// Created once per scheduled run from the watch-list; immutable for the
/// run's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRequest {
    pub symbol: SymbolCode,
    pub timeframe: Timeframe,
    pub bar_limit: usize,
    pub position: Option<PositionInfo>,
}

impl SymbolRequest {
    pub fn new(symbol: SymbolCode, timeframe: Timeframe, bar_limit: usize) -> Self {
        Self {
            symbol,
            timeframe,
            bar_limit,
            position: None,
        }
    }

    pub fn with_position(mut self, position: PositionInfo) -> Self {
        self.position = Some(position);
        self
    }
}
