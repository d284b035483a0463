//! Domain types shared across the pipeline.

pub mod bar;
pub mod request;
pub mod symbol;
pub mod timeframe;

pub use bar::{Bar, BarSeries};
pub use request::{PositionInfo, SymbolRequest};
pub use symbol::SymbolCode;
pub use timeframe::Timeframe;
