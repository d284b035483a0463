//! Report-path manifest.
//!
//! Plain text, one generated report path per line, overwritten on
//! every run. The delivery step tails this file to learn what to send.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn write_report_paths(path: &Path, reports: &[PathBuf]) -> Result<()> {
    let mut body = String::new();
    for report in reports {
        writeln!(body, "{}", report.display()).expect("writing to a String cannot fail");
    }
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write report manifest to {}", path.display()))?;
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────
