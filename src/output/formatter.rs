use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::scoring::{ScoreResult, SkipReason};

/// Check if stderr is a TTY (the breakdown is written there)
pub fn should_use_colors() -> bool {
    std::io::stderr().is_terminal()
}

/// Format a number without a trailing ".0" and without negative zero
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// The final score, as printed on stdout
pub fn format_total(result: &ScoreResult) -> String {
    format_number(result.total)
}

/// The whole result as pretty JSON
pub fn format_json(result: &ScoreResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize score")
}

fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Disabled => "disabled".to_string(),
        SkipReason::Unresolved => "not loaded".to_string(),
        SkipReason::Failed(detail) => format!("failed: {}", detail),
    }
}

/// Per-attribute breakdown: scored attributes first, then skipped ones, each
/// group in declaration order, then the total.
/// Format: "{name}  {raw} x {weight} = {weighted}" or "{name}  skipped ({reason})"
pub fn format_breakdown(result: &ScoreResult, use_colors: bool) -> String {
    let breakdown = &result.breakdown;
    let width = breakdown
        .contributions
        .iter()
        .map(|c| c.name.len())
        .chain(breakdown.skipped.iter().map(|s| s.name.len()))
        .max()
        .unwrap_or(0);

    let mut lines = Vec::new();

    for c in &breakdown.contributions {
        let name = format!("{:<width$}", c.name, width = width);
        let weighted = format_number(c.weighted);
        if use_colors {
            lines.push(format!(
                "  {}  {} x {} = {}",
                name.bold(),
                format_number(c.raw),
                format_number(c.weight),
                weighted.green()
            ));
        } else {
            lines.push(format!(
                "  {}  {} x {} = {}",
                name,
                format_number(c.raw),
                format_number(c.weight),
                weighted
            ));
        }
    }

    for s in &breakdown.skipped {
        let name = format!("{:<width$}", s.name, width = width);
        let reason = format!("skipped ({})", describe_skip(&s.reason));
        if use_colors {
            lines.push(format!("  {}  {}", name.bold(), reason.yellow()));
        } else {
            lines.push(format!("  {}  {}", name, reason));
        }
    }

    let total = format!("Total: {}", format_total(result));
    if use_colors {
        lines.push(total.bold().to_string());
    } else {
        lines.push(total);
    }

    lines.join("\n")
}
