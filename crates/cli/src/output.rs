//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use threshold_core::alerts::AlertState;
use threshold_core::resolve::ThresholdSource;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message on one line
pub fn print_error(message: &str) {
    let single_line = message.split_whitespace().collect::<Vec<_>>().join(" ");
    eprintln!("{} {}", "✗".red().bold(), single_line);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a threshold value without a trailing `.0`
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Color severity based on value
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "critical" | "page" => severity.red().to_string(),
        "warning" => severity.yellow().to_string(),
        "info" | "low" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

pub fn color_source(source: ThresholdSource) -> String {
    match source {
        ThresholdSource::Custom => "custom".cyan().to_string(),
        ThresholdSource::Default => "default".dimmed().to_string(),
    }
}

/// Color alert state based on value
pub fn color_alert_state(state: AlertState) -> String {
    let text = state.to_string();
    match state {
        AlertState::Firing => text.red().bold().to_string(),
        AlertState::Pending => text.yellow().to_string(),
        AlertState::Inactive => text.green().to_string(),
        AlertState::Unknown => text.dimmed().to_string(),
    }
}
