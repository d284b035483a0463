//! Volume unit reconciliation between bar sources.
//!
//! The two upstreams report volume in different units: the historical
//! gateway in shares, the intraday endpoint in lots of 100. Mixing them
//! unscaled corrupts the merged series, so before merging we detect the
//! mismatch and rescale one side. All thresholds are named constants so
//! tests can target each band independently.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::domain::Bar;

/// Minimum sample for the single-source lot heuristic.
pub const MIN_SINGLE_SOURCE_POINTS: usize = 50;
/// Share of volumes that must be multiples of 100 to count as share-denominated.
pub const LOT_MATCH_THRESHOLD: f64 = 0.90;
/// Minimum overlapping timestamps required to attempt two-source reconciliation.
pub const MIN_OVERLAP_POINTS: usize = 10;
/// Two-source ratio sample: the most recent N overlapping points.
pub const OVERLAP_WINDOW: usize = 200;
/// Band half-width around each ratio center (25%).
pub const RATIO_BAND_TOLERANCE: f64 = 0.25;

/// What the reconciler decided to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeAdjustment {
    /// Series are already compatible, or irreconcilable: leave both alone.
    None,
    /// Multiply source A's volumes by the factor.
    ScaleA(f64),
    /// Multiply source B's volumes by the factor.
    ScaleB(f64),
}

fn within_band(ratio: f64, center: f64) -> bool {
    ratio >= center * (1.0 - RATIO_BAND_TOLERANCE)
        && ratio <= center * (1.0 + RATIO_BAND_TOLERANCE)
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Single-source unit heuristic.
///
/// Needs at least [`MIN_SINGLE_SOURCE_POINTS`] volumes. If fewer than
/// [`LOT_MATCH_THRESHOLD`] of them are multiples of 100, the source is
/// reporting lot counts; returns `Some(100.0)` to convert to shares.
pub fn infer_single_source_scale(bars: &[Bar]) -> Option<f64> {
    if bars.len() < MIN_SINGLE_SOURCE_POINTS {
        return None;
    }
    let matches = bars
        .iter()
        .filter(|b| b.volume.rem_euclid(100.0) == 0.0)
        .count();
    let share = matches as f64 / bars.len() as f64;
    if share < LOT_MATCH_THRESHOLD {
        Some(100.0)
    } else {
        None
    }
}

/// Two-source reconciliation plan over the median volume ratio A/B.
///
/// Ratio bands (each ±25% of its center) and the correction they imply:
/// near 1000 or 100 → B under-reports, scale B up; near 0.01 or 0.001 →
/// A under-reports, scale A up. Outside every band the series are treated
/// as already compatible or irreconcilable and left alone.
pub fn plan_two_source(series_a: &[Bar], series_b: &[Bar]) -> VolumeAdjustment {
    let b_index: BTreeMap<NaiveDateTime, f64> =
        series_b.iter().map(|b| (b.timestamp, b.volume)).collect();

    // Ratios ordered by timestamp; zero volumes (suspension rows) excluded.
    let mut ratios: Vec<(NaiveDateTime, f64)> = series_a
        .iter()
        .filter_map(|a| {
            let vb = *b_index.get(&a.timestamp)?;
            if a.volume > 0.0 && vb > 0.0 {
                Some((a.timestamp, a.volume / vb))
            } else {
                None
            }
        })
        .collect();

    if ratios.len() < MIN_OVERLAP_POINTS {
        debug!(
            overlap = ratios.len(),
            "too few overlapping points, skipping volume reconciliation"
        );
        return VolumeAdjustment::None;
    }

    if ratios.len() > OVERLAP_WINDOW {
        ratios.drain(..ratios.len() - OVERLAP_WINDOW);
    }

    let mut values: Vec<f64> = ratios.into_iter().map(|(_, r)| r).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let ratio = median(&values);

    if within_band(ratio, 1000.0) {
        VolumeAdjustment::ScaleB(1000.0)
    } else if within_band(ratio, 100.0) {
        VolumeAdjustment::ScaleB(100.0)
    } else if within_band(ratio, 0.01) {
        VolumeAdjustment::ScaleA(100.0)
    } else if within_band(ratio, 0.001) {
        VolumeAdjustment::ScaleA(1000.0)
    } else {
        VolumeAdjustment::None
    }
}

fn apply_scale(bars: &mut [Bar], factor: f64) {
    for bar in bars {
        bar.volume *= factor;
    }
}

/// Reconcile volume units in place before merging.
///
/// One populated series → the single-source heuristic; two → the median
/// ratio bands. Returns the adjustment applied, for logging and tests.
pub fn reconcile_volume_units(
    series_a: &mut [Bar],
    series_b: &mut [Bar],
) -> VolumeAdjustment {
    let adjustment = match (series_a.is_empty(), series_b.is_empty()) {
        (true, true) => VolumeAdjustment::None,
        (false, true) => infer_single_source_scale(series_a)
            .map(VolumeAdjustment::ScaleA)
            .unwrap_or(VolumeAdjustment::None),
        (true, false) => infer_single_source_scale(series_b)
            .map(VolumeAdjustment::ScaleB)
            .unwrap_or(VolumeAdjustment::None),
        (false, false) => plan_two_source(series_a, series_b),
    };

    match adjustment {
        VolumeAdjustment::None => {}
        VolumeAdjustment::ScaleA(factor) => {
            info!(factor, "rescaling source A volumes");
            apply_scale(series_a, factor);
        }
        VolumeAdjustment::ScaleB(factor) => {
            info!(factor, "rescaling source B volumes");
            apply_scale(series_b, factor);
        }
    }
    adjustment
}
