//! Prompt template resolution and rendering.
//!
//! The template comes from configuration (inline), from a template file
//! kept out of version control, or from the built-in default, in that
//! order. Placeholders: {symbol}, {latest_time}, {latest_price},
//! {csv_data}, {position_context}.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::domain::{Bar, PositionInfo, SymbolCode};
use crate::indicators::ChartOverlays;

/// Fixed analyst persona sent as the system instruction. Providers that
/// lack a system role prepend it to the user prompt.
pub const SYSTEM_INSTRUCTION: &str = "You are a seasoned equity technical analyst. \
You read intraday OHLCV series through the lens of the Wyckoff method: accumulation \
and distribution structures, and effort versus result. You answer in structured \
Markdown with clear section headings, you state uncertainty honestly, and you never \
invent data that is not in the provided series.";

/// Built-in template used when neither configuration nor the template
/// file provides one.
pub const DEFAULT_TEMPLATE: &str = "\
Analyze the recent intraday price action of stock {symbol}.

Latest bar: close {latest_price} at {latest_time}.

{position_context}

OHLCV data, oldest first, CSV:
{csv_data}

Work strictly from the data above. Identify the current Wyckoff phase, notable \
supply and demand events (springs, upthrusts, tests, signs of strength or weakness), \
key support and resistance levels, and whether volume confirms or contradicts price. \
Close with a short outlook for the next few sessions and the level that would \
invalidate it.";

/// Everything substituted into the template for one symbol.
#[derive(Debug)]
pub struct PromptContext<'a> {
    pub symbol: &'a SymbolCode,
    pub latest_time: NaiveDateTime,
    pub latest_price: f64,
    pub csv_data: String,
    pub position_context: String,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Resolve the template once at startup: inline configuration first,
    /// then the template file, then the built-in default.
    pub fn resolve(inline: Option<String>, file: &Path) -> Self {
        if let Some(template) = inline {
            info!("using prompt template from configuration");
            return Self::from_template(template);
        }
        match fs::read_to_string(file) {
            Ok(template) if !template.trim().is_empty() => {
                info!(path = %file.display(), "using prompt template file");
                Self::from_template(template)
            }
            Ok(_) => {
                warn!(path = %file.display(), "prompt template file is empty, using built-in");
                Self::from_template(DEFAULT_TEMPLATE.to_string())
            }
            Err(_) => Self::from_template(DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn builtin() -> Self {
        Self::from_template(DEFAULT_TEMPLATE.to_string())
    }

    fn from_template(template: String) -> Self {
        if !template.contains("{csv_data}") {
            warn!("prompt template lacks the {{csv_data}} placeholder, the model will not see the series");
        }
        Self { template }
    }

    pub fn render(&self, ctx: &PromptContext<'_>) -> String {
        self.template
            .replace("{symbol}", ctx.symbol.as_str())
            .replace(
                "{latest_time}",
                &ctx.latest_time.format("%Y-%m-%d %H:%M").to_string(),
            )
            .replace("{latest_price}", &format!("{:.2}", ctx.latest_price))
            .replace("{csv_data}", &ctx.csv_data)
            .replace("{position_context}", &ctx.position_context)
    }
}

/// CSV rendering of one series with its overlays, oldest first. The
/// same text feeds the {csv_data} placeholder, the bars artifact and
/// the chart sidecar. Moving-average cells are blank during warmup.
pub fn series_csv(bars: &[Bar], overlays: &ChartOverlays) -> String {
    encode_series(bars, overlays).expect("in-memory csv write cannot fail")
}

fn encode_series(bars: &[Bar], overlays: &ChartOverlays) -> csv::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "date", "open", "high", "low", "close", "volume", "ma50", "ma200",
    ])?;
    for (i, bar) in bars.iter().enumerate() {
        writer.write_record([
            bar.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            overlay_cell(overlays.ma50.get(i)),
            overlay_cell(overlays.ma200.get(i)),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8(bytes).expect("csv output is utf-8"))
}

fn overlay_cell(value: Option<&f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.4}"),
        _ => String::new(),
    }
}

/// Position line for the prompt. The no-position case is stated
/// explicitly so the model does not assume one.
pub fn position_context(position: Option<&PositionInfo>, latest_close: f64) -> String {
    match position {
        Some(p) => {
            let pnl = p.open_pnl(latest_close);
            let pct = if p.cost_price > 0.0 {
                (latest_close - p.cost_price) / p.cost_price * 100.0
            } else {
                0.0
            };
            format!(
                "Held position: {} shares bought {} at {:.2}. Open P&L {:+.2} ({:+.2}%).",
                p.quantity, p.buy_date, p.cost_price, pnl, pct
            )
        }
        None => "No position is currently held in this stock.".to_string(),
    }
}
