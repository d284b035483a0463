//! End-to-end batch runs over fakes and a temp directory.
//!
//! No network, no sleeps (cooldown zeroed): real config parsing, real
//! gate, real artifacts on disk, fake bar source and narrative
//! provider.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;

use marketbrief_core::calendar::TradingCalendar;
use marketbrief_core::data::{BarSource, SourceError};
use marketbrief_core::domain::{Bar, PositionInfo, SymbolCode, SymbolRequest, Timeframe};
use marketbrief_core::narrative::{
    NarrativeError, NarrativeProvider, NarrativeRequest, PromptTemplate, ProviderChain,
};
use marketbrief_runner::config::Config;
use marketbrief_runner::pipeline::{run_batch, PipelineContext};
use marketbrief_runner::run_state::InMemoryRunStateStore;
use marketbrief_runner::schedule::GateDecision;
use marketbrief_runner::watchlist::StaticWatchlist;

// ── Fakes ────────────────────────────────────────────────────────────

struct FakeSource {
    by_symbol: HashMap<String, Vec<Bar>>,
    calls: Cell<usize>,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            by_symbol: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    fn with(mut self, code: &str, bars: Vec<Bar>) -> Self {
        self.by_symbol.insert(code.to_string(), bars);
        self
    }
}

impl BarSource for FakeSource {
    fn name(&self) -> &str {
        "fake-intraday"
    }

    fn fetch(
        &self,
        symbol: &SymbolCode,
        _timeframe: Timeframe,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Bar>, SourceError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .by_symbol
            .get(symbol.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Always-succeeding provider whose call count and last prompt stay
/// observable after the provider moves into the chain.
struct FakeProvider {
    reply: &'static str,
    calls: Rc<Cell<u32>>,
    last_prompt: Rc<RefCell<Option<String>>>,
}

impl FakeProvider {
    fn new(reply: &'static str) -> (Self, Rc<Cell<u32>>, Rc<RefCell<Option<String>>>) {
        let calls = Rc::new(Cell::new(0));
        let last_prompt = Rc::new(RefCell::new(None));
        let provider = Self {
            reply,
            calls: Rc::clone(&calls),
            last_prompt: Rc::clone(&last_prompt),
        };
        (provider, calls, last_prompt)
    }
}

impl NarrativeProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake-llm"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        self.calls.set(self.calls.get() + 1);
        *self.last_prompt.borrow_mut() = Some(request.prompt.clone());
        Ok(self.reply.to_string())
    }
}

fn simple_chain(reply: &'static str) -> ProviderChain {
    let (provider, _, _) = FakeProvider::new(reply);
    ProviderChain::new(vec![Box::new(provider)])
}

// ── Helpers ──────────────────────────────────────────────────────────

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
}

fn calendar() -> TradingCalendar {
    // Previous Mon-Fri plus today.
    let days: BTreeSet<NaiveDate> = [-7, -6, -5, -4, -3, 0]
        .iter()
        .map(|d| monday() + Duration::days(*d))
        .collect();
    TradingCalendar::new(days, false)
}

/// 5-minute morning bars for `date`, 09:35 up to and including `until`.
fn morning_bars(date: NaiveDate, until: (u32, u32), volume: f64) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut t = date.and_hms_opt(9, 35, 0).unwrap();
    let stop = date.and_hms_opt(until.0, until.1, 0).unwrap();
    let mut close = 12.0;
    while t <= stop {
        bars.push(Bar {
            timestamp: t,
            open: close,
            high: close + 0.05,
            low: close - 0.05,
            close: close + 0.01,
            volume,
        });
        close += 0.01;
        t += Duration::minutes(5);
    }
    bars
}

fn test_config(dir: &Path, extra: &[(&str, &str)]) -> Config {
    let data_dir = dir.join("data");
    let reports_dir = dir.join("reports");
    let mut map: HashMap<String, String> = HashMap::from([
        ("DATA_DIR".to_string(), data_dir.to_str().unwrap().to_string()),
        (
            "REPORTS_DIR".to_string(),
            reports_dir.to_str().unwrap().to_string(),
        ),
        ("SYMBOL_COOLDOWN_SECS".to_string(), "0".to_string()),
    ]);
    for (k, v) in extra {
        map.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn request(code: &str) -> SymbolRequest {
    SymbolRequest::new(SymbolCode::parse(code).unwrap(), Timeframe::M5, 600)
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn scheduled_run_writes_artifacts_and_completes_the_slot() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[("SCHEDULE_ENFORCED", "true")]);
    let cal = calendar();
    let source = FakeSource::new().with("600970", morning_bars(monday(), (11, 30), 40_000.0));
    let (provider, llm_calls, last_prompt) =
        FakeProvider::new("## Phase\n\nAccumulation with rising demand.");
    let chain = ProviderChain::new(vec![Box::new(provider)]);
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let held = request("600970").with_position(PositionInfo {
        buy_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        cost_price: 11.5,
        quantity: 2000.0,
    });
    let watchlist = StaticWatchlist::new(vec![held]);

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let now = monday().and_hms_opt(11, 45, 0).unwrap();
    let summary = run_batch(&ctx, now).unwrap();

    assert!(matches!(summary.decision, GateDecision::Active(ref s) if s.label() == "1140"));
    assert_eq!(summary.total, 1);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);

    // Report content.
    let report_path = dir
        .path()
        .join("reports")
        .join("600970_report_20250825_114500.md");
    assert_eq!(summary.report_paths, vec![report_path.clone()]);
    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.starts_with("# Technical Brief: 600970 (5min)"));
    assert!(report.contains("- Latest bar: 2025-08-25 11:30"));
    assert!(report.contains("## Position"));
    assert!(report.contains("Accumulation with rising demand."));
    assert!(report.contains("![chart](600970_chart_20250825_114500.png)"));
    assert!(report.contains("*Narrative by fake-llm."));

    // Artifacts.
    let bars_csv = dir
        .path()
        .join("data")
        .join("600970_5min_20250825_114500.csv");
    let chart_csv = dir
        .path()
        .join("reports")
        .join("600970_chart_20250825_114500.csv");
    assert!(bars_csv.exists());
    assert!(chart_csv.exists());
    assert_eq!(
        fs::read_to_string(&bars_csv).unwrap(),
        fs::read_to_string(&chart_csv).unwrap()
    );
    let manifest = fs::read_to_string(dir.path().join("data").join("report_paths.txt")).unwrap();
    assert_eq!(manifest.trim_end(), report_path.display().to_string());

    // The prompt the model saw carries the series and the position.
    let prompt = last_prompt.borrow().clone().unwrap();
    assert!(prompt.contains("2025-08-25 11:30"));
    assert!(prompt.contains("Held position: 2000 shares"));

    // Slot recorded; an invocation later in the window does nothing.
    assert!(store.snapshot().is_completed(monday(), "1140"));
    let again = run_batch(&ctx, monday().and_hms_opt(11, 50, 0).unwrap()).unwrap();
    assert!(matches!(again.decision, GateDecision::Skip(_)));
    assert_eq!(again.generated, 0);
    assert_eq!(llm_calls.get(), 1);
}

#[test]
fn bypassed_gate_runs_every_invocation_without_recording() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let cal = calendar();
    let source = FakeSource::new().with("600970", morning_bars(monday(), (11, 30), 40_000.0));
    let chain = simple_chain("ok");
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let watchlist = StaticWatchlist::new(vec![request("600970")]);

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let first = run_batch(&ctx, monday().and_hms_opt(11, 45, 0).unwrap()).unwrap();
    let second = run_batch(&ctx, monday().and_hms_opt(11, 46, 0).unwrap()).unwrap();

    assert_eq!(first.decision, GateDecision::Bypassed);
    assert_eq!(first.generated, 1);
    assert_eq!(second.generated, 1);
    assert!(store.snapshot().is_empty());
}

#[test]
fn one_failing_symbol_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let cal = calendar();
    let source = FakeSource::new()
        .with("600970", morning_bars(monday(), (11, 30), 40_000.0))
        .with("000001", morning_bars(monday(), (11, 30), 55_000.0));
    let chain = simple_chain("ok");
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let watchlist = StaticWatchlist::new(vec![request("600970"), request("000001")]);

    // Occupy the first symbol's bars-CSV path with a directory so the
    // artifact write fails.
    let blocked = dir.path().join("data").join("600970_5min_20250825_114500.csv");
    fs::create_dir_all(&blocked).unwrap();

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let summary = run_batch(&ctx, monday().and_hms_opt(11, 45, 0).unwrap()).unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].0.as_str(), "600970");

    // Only the surviving symbol is in the manifest.
    let manifest = fs::read_to_string(dir.path().join("data").join("report_paths.txt")).unwrap();
    assert!(manifest.contains("000001_report_20250825_114500.md"));
    assert!(!manifest.contains("600970"));
}

#[test]
fn symbol_without_bars_is_skipped_not_failed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let cal = calendar();
    let source = FakeSource::new();
    let chain = simple_chain("ok");
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let watchlist = StaticWatchlist::new(vec![request("600970")]);

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let summary = run_batch(&ctx, monday().and_hms_opt(11, 45, 0).unwrap()).unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.generated, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("data").join("report_paths.txt")).unwrap(),
        ""
    );
}

#[test]
fn irreparably_stale_series_is_skipped_under_require_fresh() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[("REQUIRE_FRESH", "true")]);
    let cal = calendar();
    // Ends 10:30; at 11:45 the lag is far past the 10-minute tolerance,
    // and the refetch returns the same stale window.
    let source = FakeSource::new().with("600970", morning_bars(monday(), (10, 30), 40_000.0));
    let chain = simple_chain("ok");
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let watchlist = StaticWatchlist::new(vec![request("600970")]);

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let summary = run_batch(&ctx, monday().and_hms_opt(11, 45, 0).unwrap()).unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.generated, 0);
    // Initial fetch plus the repair attempt.
    assert_eq!(source.calls.get(), 2);
}

#[test]
fn non_trading_day_skips_before_touching_sources() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[("SCHEDULE_ENFORCED", "true")]);
    let cal = calendar();
    let source = FakeSource::new().with("600970", morning_bars(monday(), (11, 30), 40_000.0));
    let chain = simple_chain("ok");
    let template = PromptTemplate::builtin();
    let store = InMemoryRunStateStore::default();
    let watchlist = StaticWatchlist::new(vec![request("600970")]);

    let ctx = PipelineContext {
        config: &config,
        calendar: &cal,
        intraday: &source,
        historical: None,
        chain: &chain,
        template: &template,
        state_store: &store,
        watchlist: &watchlist,
    };

    let saturday = NaiveDate::from_ymd_opt(2025, 8, 23).unwrap();
    let summary = run_batch(&ctx, saturday.and_hms_opt(11, 45, 0).unwrap()).unwrap();

    assert!(matches!(summary.decision, GateDecision::Skip(_)));
    assert_eq!(summary.total, 0);
    assert_eq!(source.calls.get(), 0);
}
