//! MarketBrief CLI — scheduled report runs and admin commands.
//!
//! Commands:
//! - `run` — gate on the push schedule and generate reports for the watch list
//! - `watchlist add|remove|list` — manage the TOML watch list
//! - `calendar refresh|status` — manage the trading-calendar cache
//! - `state show|prune` — inspect and trim recorded slot completions

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketbrief_core::calendar::{
    CalendarStore, CsvCalendarStore, SinaCalendarFeed, TradingCalendar, CACHE_MAX_AGE_DAYS,
};
use marketbrief_core::data::{BarSource, EastmoneyIntradaySource, SessionHistoricalSource};
use marketbrief_core::domain::SymbolCode;
use marketbrief_core::narrative::{
    ChatCompletionsProvider, GeminiProvider, PromptTemplate, ProviderChain,
};
use marketbrief_runner::pipeline::{run_batch, BatchSummary, PipelineContext};
use marketbrief_runner::run_state::{JsonRunStateStore, RunStateStore};
use marketbrief_runner::schedule::GateDecision;
use marketbrief_runner::watchlist::{FileWatchlist, WatchlistRow, WatchlistSource};
use marketbrief_runner::Config;
use tracing_subscriber::EnvFilter;

const CALENDAR_CACHE_FILE: &str = "trade_calendar_sina.csv";
const RUN_STATE_FILE: &str = "run_state.json";
const PROMPT_FILE: &str = "prompt_secret.txt";
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "marketbrief",
    about = "MarketBrief CLI — scheduled intraday analysis reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report batch for the current schedule window.
    Run {
        /// Generate immediately, ignoring the push schedule.
        #[arg(long, default_value_t = false)]
        ignore_schedule: bool,
    },
    /// Watch-list management commands.
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },
    /// Trading-calendar cache commands.
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },
    /// Run-state inspection commands.
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand)]
enum WatchlistAction {
    /// Add a stock to the watch list, or update its row if already present.
    Add {
        /// Stock code (6 digits, e.g. 600970).
        code: String,

        /// Purchase date (YYYY-MM-DD). Requires --cost-price and --quantity.
        #[arg(long)]
        buy_date: Option<String>,

        /// Average cost per share.
        #[arg(long)]
        cost_price: Option<f64>,

        /// Shares held.
        #[arg(long)]
        quantity: Option<f64>,

        /// Bar width in minutes (1, 5, 15, 30, 60). Defaults to 5.
        #[arg(long)]
        timeframe: Option<u32>,

        /// Bars to analyze per run. Defaults to 500.
        #[arg(long)]
        bars: Option<usize>,
    },
    /// Remove a stock from the watch list.
    Remove {
        /// Stock code to remove.
        code: String,
    },
    /// Print the effective watch list.
    List,
}

#[derive(Subcommand)]
enum CalendarAction {
    /// Fetch the trading calendar from the feed, rewriting the cache.
    Refresh,
    /// Report cached calendar coverage without touching the network.
    Status,
}

#[derive(Subcommand)]
enum StateAction {
    /// Print recorded slot completions.
    Show,
    /// Drop completions older than the retention window.
    Prune {
        /// Override RUN_STATE_RETENTION_DAYS for this invocation.
        #[arg(long)]
        retention_days: Option<i64>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run { ignore_schedule } => run_reports(config, ignore_schedule),
        Commands::Watchlist { action } => match action {
            WatchlistAction::Add {
                code,
                buy_date,
                cost_price,
                quantity,
                timeframe,
                bars,
            } => run_watchlist_add(&config, code, buy_date, cost_price, quantity, timeframe, bars),
            WatchlistAction::Remove { code } => run_watchlist_remove(&config, &code),
            WatchlistAction::List => run_watchlist_list(&config),
        },
        Commands::Calendar { action } => match action {
            CalendarAction::Refresh => run_calendar_refresh(&config),
            CalendarAction::Status => run_calendar_status(&config),
        },
        Commands::State { action } => match action {
            StateAction::Show => run_state_show(&config),
            StateAction::Prune { retention_days } => run_state_prune(&config, retention_days),
        },
    }
}

fn run_reports(mut config: Config, ignore_schedule: bool) -> Result<()> {
    if ignore_schedule {
        config.schedule.enforced = false;
    }

    let calendar_store = calendar_store(&config);
    let calendar_feed = SinaCalendarFeed::new(config.data.calendar_api_url.clone(), FEED_TIMEOUT);
    let calendar = TradingCalendar::load(
        &calendar_store,
        &calendar_feed,
        config.data.calendar_weekday_fallback,
    );

    let intraday = EastmoneyIntradaySource::new();
    let historical = config
        .data
        .hist_api_base
        .as_deref()
        .map(SessionHistoricalSource::new);

    let policy = config.narrative.retry_policy();
    let timeout = config.narrative.timeout();
    let chain = ProviderChain::new(vec![
        Box::new(GeminiProvider::new(
            config.narrative.gemini.api_key.clone(),
            config.narrative.gemini.model.clone(),
            policy,
            timeout,
        )),
        Box::new(ChatCompletionsProvider::new(
            "openai",
            config.narrative.openai.base_url.clone(),
            config.narrative.openai.api_key.clone(),
            config.narrative.openai.model.clone(),
            policy,
            timeout,
        )),
        Box::new(ChatCompletionsProvider::new(
            "deepseek",
            config.narrative.deepseek.base_url.clone(),
            config.narrative.deepseek.api_key.clone(),
            config.narrative.deepseek.model.clone(),
            policy,
            timeout,
        )),
    ]);

    let template = PromptTemplate::resolve(
        config.narrative.prompt_template.clone(),
        Path::new(PROMPT_FILE),
    );
    let state_store = JsonRunStateStore::new(config.paths.data_dir.join(RUN_STATE_FILE));
    let watchlist = file_watchlist(&config);

    let ctx = PipelineContext {
        config: &config,
        calendar: &calendar,
        intraday: &intraday,
        historical: historical.as_ref().map(|s| s as &dyn BarSource),
        chain: &chain,
        template: &template,
        state_store: &state_store,
        watchlist: &watchlist,
    };

    let summary = run_batch(&ctx, chrono::Local::now().naive_local())?;
    print_summary(&summary);

    if summary.failed > 0 {
        for (symbol, err) in &summary.errors {
            eprintln!("Error for {symbol}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_watchlist_add(
    config: &Config,
    code: String,
    buy_date: Option<String>,
    cost_price: Option<f64>,
    quantity: Option<f64>,
    timeframe: Option<u32>,
    bars: Option<usize>,
) -> Result<()> {
    let given = [buy_date.is_some(), cost_price.is_some(), quantity.is_some()];
    if given.iter().any(|&p| p) && !given.iter().all(|&p| p) {
        bail!("--buy-date, --cost-price and --quantity must be given together");
    }

    let buy_date = buy_date
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?;

    let watchlist = file_watchlist(config);
    watchlist.add_or_update(WatchlistRow {
        code,
        buy_date,
        cost_price,
        quantity,
        timeframe,
        bars,
    })?;

    println!("Watch list updated: {}", watchlist.toml_path().display());
    Ok(())
}

fn run_watchlist_remove(config: &Config, code: &str) -> Result<()> {
    let symbol = SymbolCode::parse(code)?;
    let watchlist = file_watchlist(config);
    if watchlist.remove(&symbol)? {
        println!("Removed {symbol} from {}", watchlist.toml_path().display());
    } else {
        println!("{symbol} is not on the watch list.");
    }
    Ok(())
}

fn run_watchlist_list(config: &Config) -> Result<()> {
    let watchlist = file_watchlist(config);
    let requests = watchlist.load()?;

    if requests.is_empty() {
        println!("Watch list is empty.");
        return Ok(());
    }

    println!("{:<8} {:<10} {:>6}  {}", "Code", "Timeframe", "Bars", "Position");
    println!("{}", "-".repeat(56));
    for request in &requests {
        let position = match &request.position {
            Some(p) => format!("{} shares from {} at {:.2}", p.quantity, p.buy_date, p.cost_price),
            None => "-".to_string(),
        };
        println!(
            "{:<8} {:<10} {:>6}  {}",
            request.symbol.as_str(),
            request.timeframe.to_string(),
            request.bar_limit,
            position
        );
    }
    Ok(())
}

fn run_calendar_refresh(config: &Config) -> Result<()> {
    let store = calendar_store(config);
    let feed = SinaCalendarFeed::new(config.data.calendar_api_url.clone(), FEED_TIMEOUT);
    let calendar = TradingCalendar::refresh(&store, &feed, config.data.calendar_weekday_fallback)?;
    println!(
        "Calendar refreshed: {} trading days cached at {}",
        calendar.len(),
        store.path().display()
    );
    Ok(())
}

fn run_calendar_status(config: &Config) -> Result<()> {
    let store = calendar_store(config);
    let Some(cached) = store.load()? else {
        println!("No calendar cache at {}.", store.path().display());
        println!("Run `marketbrief calendar refresh` to create one.");
        return Ok(());
    };

    let calendar = TradingCalendar::new(cached.dates, config.data.calendar_weekday_fallback);
    let today = chrono::Local::now().date_naive();
    let age_days = cached.age.as_secs() / (24 * 3600);

    println!("Calendar cache: {}", store.path().display());
    println!("Trading days:   {}", calendar.len());
    println!("Cache age:      {age_days} day(s) (refetched after {CACHE_MAX_AGE_DAYS})");
    println!(
        "Today ({today}): {}",
        if calendar.is_trading_day(today) {
            "trading day"
        } else {
            "non-trading day"
        }
    );
    if calendar.is_degraded() {
        println!("WARNING: cache holds no dates; the weekday heuristic applies");
    }
    Ok(())
}

fn run_state_show(config: &Config) -> Result<()> {
    let store = JsonRunStateStore::new(config.paths.data_dir.join(RUN_STATE_FILE));
    let state = store.load()?;

    if state.is_empty() {
        println!("No recorded runs at {}.", store.path().display());
        return Ok(());
    }

    println!("{:<12} {:<6} {}", "Date", "Slot", "Completed at");
    println!("{}", "-".repeat(40));
    for (date, slots) in state.entries() {
        for (slot, at) in slots {
            println!("{:<12} {:<6} {}", date, slot, at.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    Ok(())
}

fn run_state_prune(config: &Config, retention_days: Option<i64>) -> Result<()> {
    let retention = retention_days.unwrap_or(config.data.run_state_retention_days);
    if retention < 0 {
        bail!("--retention-days must be non-negative");
    }

    let store = JsonRunStateStore::new(config.paths.data_dir.join(RUN_STATE_FILE));
    let mut state = store.load()?;
    let pruned = state.prune_older_than(chrono::Local::now().date_naive(), retention);

    if pruned == 0 {
        println!("Nothing older than {retention} day(s) to prune.");
        return Ok(());
    }

    store.save(&state)?;
    println!("Pruned {pruned} day(s); {} remain.", state.len());
    Ok(())
}

fn calendar_store(config: &Config) -> CsvCalendarStore {
    CsvCalendarStore::new(config.paths.data_dir.join(CALENDAR_CACHE_FILE))
}

fn file_watchlist(config: &Config) -> FileWatchlist {
    FileWatchlist::new(
        ".",
        config.data.bars_count,
        config.data.symbols_fallback.clone(),
    )
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("=== Batch Result ===");
    match &summary.decision {
        GateDecision::Bypassed => println!("Gate:           bypassed"),
        GateDecision::Active(slot) => println!("Gate:           slot {slot}"),
        GateDecision::Skip(reason) => println!("Gate:           skipped ({reason})"),
    }
    println!("Symbols:        {}", summary.total);
    println!("Generated:      {}", summary.generated);
    println!("Skipped:        {}", summary.skipped);
    println!("Failed:         {}", summary.failed);

    if !summary.report_paths.is_empty() {
        println!();
        println!("--- Reports ---");
        for path in &summary.report_paths {
            println!("{}", path.display());
        }
    }
    println!();
}
