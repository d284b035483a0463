//! Report assembly and artifact export.
//!
//! Everything here produces files for downstream consumers: the chart
//! CSV for the external rasterizer, the Markdown report for rendering
//! and delivery, and the manifest listing what a run produced.

pub mod chart_data;
pub mod manifest;
pub mod markdown;

pub use chart_data::write_chart_csv;
pub use manifest::write_report_paths;
pub use markdown::render_report;
