//! Per-symbol Markdown report assembly.

use chrono::NaiveDateTime;

use marketbrief_core::domain::{Bar, SymbolRequest};
use marketbrief_core::narrative::{position_context, NarrativeOutput};

/// Assemble the full Markdown report for one symbol.
///
/// `chart_image` is the file name the rasterizer will produce next to
/// the report; the reference is emitted whether or not the image exists
/// yet.
pub fn render_report(
    request: &SymbolRequest,
    bars: &[Bar],
    narrative: &NarrativeOutput,
    chart_image: &str,
    generated_at: NaiveDateTime,
) -> String {
    let mut report = format!(
        "# Technical Brief: {} ({})\n\n",
        request.symbol, request.timeframe
    );

    report.push_str(&format!(
        "- Generated: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(latest) = bars.last() {
        report.push_str(&format!(
            "- Latest bar: {} close {:.2}\n",
            latest.timestamp.format("%Y-%m-%d %H:%M"),
            latest.close
        ));
    }
    report.push_str(&format!("- Bars analyzed: {}\n", bars.len()));

    if let (Some(position), Some(latest)) = (request.position.as_ref(), bars.last()) {
        report.push_str("\n## Position\n\n");
        report.push_str(&position_context(Some(position), latest.close));
        report.push('\n');
    }

    report.push_str(&format!("\n![chart]({chart_image})\n"));

    report.push_str("\n## Analysis\n\n");
    report.push_str(narrative.text.trim_end());
    report.push('\n');

    report.push_str("\n---\n\n");
    match &narrative.provider {
        Some(provider) => report.push_str(&format!(
            "*Narrative by {provider}. Generated automatically; not investment advice.*\n"
        )),
        None => report.push_str("*Generated automatically; not investment advice.*\n"),
    }

    report
}

// ─── Tests ───────────────────────────────────────────────────────────
