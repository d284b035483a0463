//! Watch-list resolution and administration.
//!
//! Three sources in fixed precedence: `watchlist.toml` (full rows with
//! optional position context), `stock_list.txt` (one symbol per line,
//! `#` comments), and finally the `SYMBOLS` configuration fallback.
//! Duplicate codes keep the first occurrence. The TOML file is also the
//! target of the CLI `watchlist add/remove` operations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use marketbrief_core::domain::symbol::SymbolCodeError;
use marketbrief_core::domain::timeframe::TimeframeError;
use marketbrief_core::domain::{PositionInfo, SymbolCode, SymbolRequest, Timeframe};

pub const WATCHLIST_FILE: &str = "watchlist.toml";
pub const STOCK_LIST_FILE: &str = "stock_list.txt";

/// Row-level defaults for `watchlist.toml` entries.
const ROW_DEFAULT_TIMEFRAME_MINUTES: u32 = 5;
const ROW_DEFAULT_BARS: usize = 500;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("cannot access watch-list file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse watch-list file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot encode watch-list")]
    Encode(#[from] toml::ser::Error),
    #[error(transparent)]
    Symbol(#[from] SymbolCodeError),
    #[error(transparent)]
    Timeframe(#[from] TimeframeError),
}

/// Where the current run's symbol requests come from.
pub trait WatchlistSource {
    fn load(&self) -> Result<Vec<SymbolRequest>, WatchlistError>;
}

/// One `[[stocks]]` row as stored in `watchlist.toml`.
///
/// `buy_date` is a quoted `YYYY-MM-DD` string. A position is attached to
/// the request only when buy date, cost price and quantity are all
/// present; a partial triple is dropped with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistRow {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bars: Option<usize>,
}

impl WatchlistRow {
    pub fn bare(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            buy_date: None,
            cost_price: None,
            quantity: None,
            timeframe: None,
            bars: None,
        }
    }

    fn into_request(self) -> Result<SymbolRequest, WatchlistError> {
        let symbol = SymbolCode::parse(&self.code)?;
        let timeframe =
            Timeframe::from_minutes(self.timeframe.unwrap_or(ROW_DEFAULT_TIMEFRAME_MINUTES))?;
        let bars = self.bars.unwrap_or(ROW_DEFAULT_BARS);
        let mut request = SymbolRequest::new(symbol, timeframe, bars);

        match (self.buy_date, self.cost_price, self.quantity) {
            (Some(buy_date), Some(cost_price), Some(quantity)) => {
                request = request.with_position(PositionInfo {
                    buy_date,
                    cost_price,
                    quantity,
                });
            }
            (None, None, None) => {}
            _ => {
                warn!(
                    symbol = %request.symbol,
                    "incomplete position fields on watch-list row, treating as no position"
                );
            }
        }
        Ok(request)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WatchlistDoc {
    #[serde(default)]
    stocks: Vec<WatchlistRow>,
}

/// File-backed watch-list rooted in one directory.
pub struct FileWatchlist {
    dir: PathBuf,
    default_bars: usize,
    env_fallback: Vec<String>,
}

impl FileWatchlist {
    pub fn new(dir: impl Into<PathBuf>, default_bars: usize, env_fallback: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            default_bars,
            env_fallback,
        }
    }

    pub fn toml_path(&self) -> PathBuf {
        self.dir.join(WATCHLIST_FILE)
    }

    fn text_path(&self) -> PathBuf {
        self.dir.join(STOCK_LIST_FILE)
    }

    /// Raw rows of `watchlist.toml`; empty when the file does not exist.
    pub fn rows(&self) -> Result<Vec<WatchlistRow>, WatchlistError> {
        Ok(self.read_doc()?.stocks)
    }

    /// Insert or replace the row whose code matches `row.code`.
    pub fn add_or_update(&self, row: WatchlistRow) -> Result<(), WatchlistError> {
        // Reject malformed rows before touching the file.
        row.clone().into_request()?;
        let code = SymbolCode::parse(&row.code)?;

        let mut doc = self.read_doc()?;
        match doc
            .stocks
            .iter_mut()
            .find(|existing| SymbolCode::parse(&existing.code).as_ref() == Ok(&code))
        {
            Some(existing) => *existing = row,
            None => doc.stocks.push(row),
        }
        self.write_doc(&doc)
    }

    /// Remove every row matching `code`. Returns whether any row matched.
    pub fn remove(&self, code: &SymbolCode) -> Result<bool, WatchlistError> {
        let mut doc = self.read_doc()?;
        let before = doc.stocks.len();
        doc.stocks
            .retain(|row| SymbolCode::parse(&row.code).as_ref() != Ok(code));
        if doc.stocks.len() == before {
            return Ok(false);
        }
        self.write_doc(&doc)?;
        Ok(true)
    }

    fn read_doc(&self) -> Result<WatchlistDoc, WatchlistError> {
        let path = self.toml_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WatchlistDoc::default()),
            Err(e) => return Err(WatchlistError::Io { path, source: e }),
        };
        toml::from_str(&raw).map_err(|e| WatchlistError::Parse { path, source: e })
    }

    fn write_doc(&self, doc: &WatchlistDoc) -> Result<(), WatchlistError> {
        let path = self.toml_path();
        let encoded = toml::to_string_pretty(doc)?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, encoded).map_err(|e| WatchlistError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| WatchlistError::Io { path, source: e })
    }

    fn load_text(&self, path: &Path) -> Result<Vec<SymbolRequest>, WatchlistError> {
        let raw = fs::read_to_string(path).map_err(|e| WatchlistError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| self.plain_request(line))
            .collect()
    }

    fn plain_request(&self, code: &str) -> Result<SymbolRequest, WatchlistError> {
        Ok(SymbolRequest::new(
            SymbolCode::parse(code)?,
            Timeframe::M5,
            self.default_bars,
        ))
    }
}

impl WatchlistSource for FileWatchlist {
    fn load(&self) -> Result<Vec<SymbolRequest>, WatchlistError> {
        let toml_path = self.toml_path();
        let requests = if toml_path.exists() {
            debug!(path = %toml_path.display(), "loading watch-list file");
            self.read_doc()?
                .stocks
                .into_iter()
                .map(WatchlistRow::into_request)
                .collect::<Result<Vec<_>, _>>()?
        } else if self.text_path().exists() {
            debug!(path = %self.text_path().display(), "loading plain stock list");
            self.load_text(&self.text_path())?
        } else {
            info!("no watch-list file found, using configured symbol fallback");
            self.env_fallback
                .iter()
                .map(|code| self.plain_request(code))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(dedupe(requests))
    }
}

/// Fixed request list, for tests and one-off invocations.
pub struct StaticWatchlist {
    requests: Vec<SymbolRequest>,
}

impl StaticWatchlist {
    pub fn new(requests: Vec<SymbolRequest>) -> Self {
        Self { requests }
    }
}

impl WatchlistSource for StaticWatchlist {
    fn load(&self) -> Result<Vec<SymbolRequest>, WatchlistError> {
        Ok(self.requests.clone())
    }
}

fn dedupe(requests: Vec<SymbolRequest>) -> Vec<SymbolRequest> {
    let mut seen: Vec<SymbolCode> = Vec::new();
    let mut unique = Vec::with_capacity(requests.len());
    for request in requests {
        if seen.contains(&request.symbol) {
            warn!(symbol = %request.symbol, "duplicate watch-list entry ignored");
            continue;
        }
        seen.push(request.symbol.clone());
        unique.push(request);
    }
    unique
}

// ─── Tests ───────────────────────────────────────────────────────────
