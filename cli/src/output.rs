use colored::Colorize;
use serde::Serialize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn subheader(title: &str) {
    println!("{}", title.bold());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// One aligned `label: value` line.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<18} {}", format!("{label}:").dimmed(), value);
}

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Compact rendering of a JSON value for one-line diffs.
pub fn value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "∅".to_string(),
        serde_json::Value::String(s) => format!("{s:?}"),
        other => other.to_string()
    }
}
