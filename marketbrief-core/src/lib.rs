//! MarketBrief Core — domain types, market data acquisition, trading
//! calendar, chart overlays, narrative generation.
//!
//! This crate contains everything below the pipeline:
//! - Domain types (bars, symbol codes, timeframes, per-symbol requests)
//! - Bar sources (Eastmoney intraday klines, session-gateway history)
//!   behind the `BarSource` trait
//! - Volume unit reconciliation and two-source merging
//! - Trading calendar with cached feed and freshness validation
//! - ma50/ma200 overlays and the shared series CSV encoding
//! - Prompt templating and the narrative provider fallback chain

pub mod calendar;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod narrative;
