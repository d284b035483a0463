//! MarketBrief Runner — pipeline orchestration on top of `marketbrief-core`.
//!
//! This crate provides:
//! - Environment-backed configuration with pure, testable parsing
//! - The schedule gate (push slots, lag window, per-day completion)
//! - Persisted run state with retention pruning
//! - Watch-list resolution (TOML rows, plain list, env fallback)
//! - Report assembly: Markdown report, chart CSV sidecar, manifest
//! - The sequential per-symbol batch loop

pub mod config;
pub mod pipeline;
pub mod reporting;
pub mod run_state;
pub mod schedule;
pub mod watchlist;

pub use config::{Config, ConfigError};
pub use pipeline::{run_batch, BatchSummary, PipelineContext};
pub use run_state::{
    InMemoryRunStateStore, JsonRunStateStore, RunState, RunStateStore, StateError,
};
pub use schedule::{GateDecision, ScheduleGate, SkipReason, Slot, SlotParseError};
pub use watchlist::{
    FileWatchlist, StaticWatchlist, WatchlistError, WatchlistRow, WatchlistSource,
};
