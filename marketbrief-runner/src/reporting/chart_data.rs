//! Series CSV export.
//!
//! One format serves two artifacts: the chart sidecar the external
//! rasterizer consumes and the per-symbol bars archive under the data
//! directory. Columns `date,open,high,low,close,volume,ma50,ma200`,
//! moving-average cells blank during warmup.

use std::path::Path;

use anyhow::{Context, Result};

use marketbrief_core::domain::Bar;
use marketbrief_core::indicators::ChartOverlays;
use marketbrief_core::narrative::series_csv;

pub fn write_chart_csv(path: &Path, bars: &[Bar], overlays: &ChartOverlays) -> Result<()> {
    std::fs::write(path, series_csv(bars, overlays))
        .with_context(|| format!("Failed to write series CSV to {}", path.display()))?;
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────
