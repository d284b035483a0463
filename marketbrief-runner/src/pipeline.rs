//! The per-run batch loop.
//!
//! One invocation = one gate decision = at most one batch. Symbols are
//! processed strictly sequentially with a cooldown between them; a
//! failure in one symbol is recorded and the batch moves on. Run state
//! is saved exactly once, after the whole batch, so a crash mid-batch
//! leaves the slot pending and the next invocation retries it.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use marketbrief_core::calendar::TradingCalendar;
use marketbrief_core::data::{
    lookback_days, merge, reconcile_volume_units, BarSource, FreshnessValidator, VolumeAdjustment,
};
use marketbrief_core::domain::{SymbolCode, SymbolRequest};
use marketbrief_core::indicators::ChartOverlays;
use marketbrief_core::narrative::{
    position_context, series_csv, NarrativeRequest, PromptContext, PromptTemplate, ProviderChain,
    SYSTEM_INSTRUCTION,
};

use crate::config::Config;
use crate::reporting::{render_report, write_chart_csv, write_report_paths};
use crate::run_state::RunStateStore;
use crate::schedule::{GateDecision, ScheduleGate};
use crate::watchlist::WatchlistSource;

/// Everything `run_batch` needs, injected so tests run it end to end
/// with fakes and a temp directory.
pub struct PipelineContext<'a> {
    pub config: &'a Config,
    pub calendar: &'a TradingCalendar,
    pub intraday: &'a dyn BarSource,
    pub historical: Option<&'a dyn BarSource>,
    pub chain: &'a ProviderChain,
    pub template: &'a PromptTemplate,
    pub state_store: &'a dyn RunStateStore,
    pub watchlist: &'a dyn WatchlistSource,
}

/// What one invocation did.
#[derive(Debug)]
pub struct BatchSummary {
    pub decision: GateDecision,
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(SymbolCode, String)>,
    pub report_paths: Vec<PathBuf>,
}

impl BatchSummary {
    fn skipped_run(decision: GateDecision) -> Self {
        Self {
            decision,
            total: 0,
            generated: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
            report_paths: Vec::new(),
        }
    }
}

pub fn run_batch(ctx: &PipelineContext<'_>, now: NaiveDateTime) -> Result<BatchSummary> {
    let config = ctx.config;
    fs::create_dir_all(&config.paths.data_dir)
        .with_context(|| format!("Failed to create {}", config.paths.data_dir.display()))?;
    fs::create_dir_all(&config.paths.reports_dir)
        .with_context(|| format!("Failed to create {}", config.paths.reports_dir.display()))?;

    let mut state = ctx.state_store.load().context("Failed to load run state")?;
    let pruned = state.prune_older_than(now.date(), config.data.run_state_retention_days);
    if pruned > 0 {
        info!(pruned, "pruned old run-state days");
    }

    let gate = ScheduleGate::new(
        config.schedule.enforced,
        config.schedule.slots.clone(),
        config.schedule.lag_minutes,
    );
    let decision = gate.decide(now, ctx.calendar, &state);
    match &decision {
        GateDecision::Skip(reason) => {
            info!(%reason, "invocation gated off");
            return Ok(BatchSummary::skipped_run(decision));
        }
        GateDecision::Active(slot) => info!(slot = %slot, "slot window active"),
        GateDecision::Bypassed => info!("schedule enforcement off, running unconditionally"),
    }

    let requests = ctx.watchlist.load().context("Failed to load watch-list")?;
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    info!(symbols = requests.len(), stamp = %stamp, "starting batch");

    let mut summary = BatchSummary::skipped_run(decision);
    summary.total = requests.len();

    for (idx, request) in requests.iter().enumerate() {
        if idx > 0 && config.data.symbol_cooldown_secs > 0 {
            std::thread::sleep(Duration::from_secs(config.data.symbol_cooldown_secs));
        }
        match process_symbol(ctx, request, now, &stamp) {
            Ok(Some(report_path)) => {
                summary.generated += 1;
                summary.report_paths.push(report_path);
            }
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                error!(symbol = %request.symbol, "symbol failed: {e:#}");
                summary.failed += 1;
                summary.errors.push((request.symbol.clone(), format!("{e:#}")));
            }
        }
    }

    let manifest_path = config.paths.data_dir.join("report_paths.txt");
    write_report_paths(&manifest_path, &summary.report_paths)?;

    if let GateDecision::Active(slot) = &summary.decision {
        state.mark_completed(now.date(), slot.label(), now);
    }
    ctx.state_store
        .save(&state)
        .context("Failed to save run state")?;

    info!(
        total = summary.total,
        generated = summary.generated,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );
    Ok(summary)
}

/// One symbol end to end. `Ok(None)` means the symbol was skipped with
/// a logged reason (no usable series); `Err` is recorded by the caller
/// and never aborts the batch.
fn process_symbol(
    ctx: &PipelineContext<'_>,
    request: &SymbolRequest,
    now: NaiveDateTime,
    stamp: &str,
) -> Result<Option<PathBuf>> {
    let config = ctx.config;
    let symbol = &request.symbol;
    info!(
        symbol = %symbol,
        timeframe = %request.timeframe,
        bars = request.bar_limit,
        "processing symbol"
    );

    let start =
        now.date() - chrono::Duration::days(lookback_days(request.timeframe, request.bar_limit));
    let end = now.date();

    // Historical gateway only serves 5-minute and wider bars.
    let mut historical = match ctx.historical {
        Some(source) if request.timeframe.minutes() >= 5 => {
            source.fetch_or_empty(symbol, request.timeframe, start, end)
        }
        _ => Vec::new(),
    };
    let mut intraday = ctx
        .intraday
        .fetch_or_empty(symbol, request.timeframe, start, end);

    if historical.is_empty() && intraday.is_empty() {
        warn!(symbol = %symbol, "no bars from any source, skipping");
        return Ok(None);
    }

    let adjustment = reconcile_volume_units(&mut historical, &mut intraday);
    if adjustment != VolumeAdjustment::None {
        info!(symbol = %symbol, ?adjustment, "volume units reconciled");
    }

    let merged = merge(historical, intraday, request.bar_limit);

    let validator = FreshnessValidator::new(ctx.calendar, ctx.intraday, config.data.require_fresh);
    let (series, outcome) =
        validator.validate(symbol, request.timeframe, merged, request.bar_limit, now);
    if series.is_empty() {
        warn!(symbol = %symbol, ?outcome, "no usable series after freshness validation, skipping");
        return Ok(None);
    }
    info!(symbol = %symbol, bars = series.len(), ?outcome, "series validated");

    let overlays = ChartOverlays::compute(&series);

    let bars_path = config
        .paths
        .data_dir
        .join(format!("{symbol}_{}_{stamp}.csv", request.timeframe));
    write_chart_csv(&bars_path, &series, &overlays)?;
    let chart_path = config
        .paths
        .reports_dir
        .join(format!("{symbol}_chart_{stamp}.csv"));
    write_chart_csv(&chart_path, &series, &overlays)?;

    let Some(latest) = series.last() else {
        return Ok(None);
    };
    let prompt_ctx = PromptContext {
        symbol,
        latest_time: latest.timestamp,
        latest_price: latest.close,
        csv_data: series_csv(&series, &overlays),
        position_context: position_context(request.position.as_ref(), latest.close),
    };
    let narrative_request = NarrativeRequest {
        system: SYSTEM_INSTRUCTION.to_string(),
        prompt: ctx.template.render(&prompt_ctx),
    };
    let narrative = ctx.chain.generate(&narrative_request);
    if narrative.is_fallback_report() {
        warn!(symbol = %symbol, "narrative unavailable, publishing failure report");
    }

    let chart_image = format!("{symbol}_chart_{stamp}.png");
    let report = render_report(request, &series, &narrative, &chart_image, now);
    let report_path = config
        .paths
        .reports_dir
        .join(format!("{symbol}_report_{stamp}.md"));
    fs::write(&report_path, report)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;

    info!(symbol = %symbol, report = %report_path.display(), "report written");
    Ok(Some(report_path))
}
