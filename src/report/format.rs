//! Formatted terminal output and the JSON summary.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::ResidualRecord;
use crate::error::AppError;
use crate::report::{FitReport, ResidualExtremes};

/// Format one fit as a terminal summary.
pub fn format_report(report: &FitReport) -> String {
    let mut out = String::new();

    out.push_str("=== ylfit - Young-Laplace drop fit ===\n");
    out.push_str(&format!("Source: {}\n", report.source));
    out.push_str(&format!(
        "Generated: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Drop: {}\n", report.drop_kind.display_name()));
    out.push_str(&format!("State: {}", report.state.display_name()));
    if !report.stop_reason.is_empty() {
        out.push_str(&format!(" ({})", report.stop_reason));
    }
    out.push('\n');
    if let Some(err) = &report.error {
        out.push_str(&format!("Error: {err}\n"));
    }

    if let Some(p) = &report.params {
        out.push_str("\nParameters:\n");
        out.push_str(&format!("- apex        : ({:.4}, {:.4}) px\n", p.apex_x, p.apex_y));
        out.push_str(&format!("- apex radius : {:.4} px\n", p.apex_radius));
        out.push_str(&format!("- Bond number : {:.6}\n", p.bond));
        out.push_str(&format!("- image angle : {:.4}°\n", p.rotation_deg));
    }

    out.push_str("\nFit diagnostics:\n");
    out.push_str(&format!("- iterations  : {}\n", report.iterations));
    if let Some(objective) = report.objective {
        out.push_str(&format!("- objective   : {objective:.6e} px²\n"));
    }
    if let Some(size) = report.profile_size {
        out.push_str(&format!("- profile size: {size:.4}\n"));
    }
    if let Some(stats) = &report.residuals {
        out.push_str(&format!(
            "- residuals   : n={} rms={:.4}px max={:.4}px mean={:+.4}px\n",
            stats.count, stats.rms, stats.max_abs, stats.mean
        ));
    }

    if let Some(d) = &report.derived {
        out.push_str("\nDerived properties:\n");
        out.push_str(&format!("- IFT          : {:.4} mN/m\n", d.ift));
        out.push_str(&format!("- volume       : {:.4} mm³\n", d.volume));
        out.push_str(&format!("- surface area : {:.4} mm²\n", d.surface_area));
        out.push_str(&format!("- Worthington  : {:.4}\n", d.worthington));
    }

    if !(report.extremes.outside.is_empty() && report.extremes.inside.is_empty()) {
        out.push('\n');
        out.push_str(&format_extremes(&report.extremes));
    }

    out
}

/// Format the largest residuals on each side of the profile.
pub fn format_extremes(extremes: &ResidualExtremes) -> String {
    let mut out = String::new();

    out.push_str("Largest outside (positive residual):\n");
    out.push_str(&format_table(&extremes.outside));
    out.push('\n');

    out.push_str("Largest inside (negative residual):\n");
    out.push_str(&format_table(&extremes.inside));

    out
}

/// Serialize reports as a pretty-printed JSON array.
pub fn format_json(reports: &[FitReport]) -> Result<String, AppError> {
    serde_json::to_string_pretty(reports)
        .map_err(|e| AppError::new(4, format!("Failed to serialize JSON summary: {e}")))
}

fn format_table(rows: &[ResidualRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>6} {:>12} {:>12}", "side", "arc_length", "residual"));
    out.push('\n');
    out.push_str(&format!("{:-<6} {:-<12} {:-<12}", "", "", ""));
    out.push('\n');

    for r in rows {
        let side = if r.arc_length < 0.0 { "left" } else { "right" };
        out.push_str(&format!(
            "{:>6} {:>12.5} {:>12.4}",
            side,
            r.arc_length.abs(),
            r.residual
        ));
        out.push('\n');
    }

    out
}
