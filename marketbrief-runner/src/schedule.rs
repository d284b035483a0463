//! Scheduled-slot gating for pipeline invocations.
//!
//! The binary is started by an external scheduler every few minutes;
//! the gate decides whether this particular invocation should run.
//! The decision is pure over its inputs (clock, calendar, run state),
//! so every path is testable without waiting for wall-clock time.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use thiserror::Error;

use marketbrief_core::calendar::TradingCalendar;

use crate::run_state::RunState;

#[derive(Debug, Error)]
#[error("invalid slot '{0}': expected HHMM, e.g. 1140")]
pub struct SlotParseError(pub String);

/// One configured push slot, identified by its HHMM label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    label: String,
    time: NaiveTime,
}

impl Slot {
    /// Parse an HHMM label ("1140" -> 11:40).
    pub fn parse(raw: &str) -> Result<Self, SlotParseError> {
        let trimmed = raw.trim();
        if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SlotParseError(raw.to_string()));
        }
        let hour: u32 = trimmed[..2].parse().map_err(|_| SlotParseError(raw.to_string()))?;
        let minute: u32 = trimmed[2..].parse().map_err(|_| SlotParseError(raw.to_string()))?;
        let time =
            NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| SlotParseError(raw.to_string()))?;
        Ok(Self {
            label: trimmed.to_string(),
            time,
        })
    }

    /// The HHMM label, also the key under which completion is recorded.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Why an invocation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NonTradingDay,
    NoSlotInWindow,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NonTradingDay => write!(f, "not a trading day"),
            SkipReason::NoSlotInWindow => {
                write!(f, "no pending slot window contains the current time")
            }
        }
    }
}

/// What this invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Enforcement is off: run unconditionally, record nothing.
    Bypassed,
    /// A pending slot's window contains now; run and record this slot.
    Active(Slot),
    /// Nothing to do.
    Skip(SkipReason),
}

pub struct ScheduleGate {
    enforced: bool,
    slots: Vec<Slot>,
    lag: Duration,
}

impl ScheduleGate {
    pub fn new(enforced: bool, slots: Vec<Slot>, lag_minutes: i64) -> Self {
        Self {
            enforced,
            slots,
            lag: Duration::minutes(lag_minutes),
        }
    }

    /// Decide for `now`. A slot is eligible while now is inside
    /// [slot, slot + lag] on a trading day and the slot has not already
    /// completed today. The first eligible slot in configured order wins.
    pub fn decide(
        &self,
        now: NaiveDateTime,
        calendar: &TradingCalendar,
        state: &RunState,
    ) -> GateDecision {
        if !self.enforced {
            return GateDecision::Bypassed;
        }
        if !calendar.is_trading_day(now.date()) {
            return GateDecision::Skip(SkipReason::NonTradingDay);
        }

        for slot in &self.slots {
            let start = now.date().and_time(slot.time);
            let end = start + self.lag;
            if now >= start && now <= end && !state.is_completed(now.date(), slot.label()) {
                return GateDecision::Active(slot.clone());
            }
        }
        GateDecision::Skip(SkipReason::NoSlotInWindow)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
