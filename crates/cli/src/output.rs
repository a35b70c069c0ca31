//! Terminal output utilities
//!
//! Consistent status lines and value formatting for the image tools.

use owo_colors::OwoColorize;
use std::time::Duration;

/// Status message helpers
pub struct Status;

impl Status {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue(), message);
    }

    /// Print a header
    pub fn header(message: &str) {
        println!();
        println!("{}", message.bold());
        println!("{}", "─".repeat(message.chars().count()));
    }

    /// Print one aligned `label value` row
    pub fn field(label: &str, value: &str) {
        println!("  {:<12} {}", label.dimmed(), value);
    }
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f32();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining_secs)
    }
}

/// Format a file size for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a count with singular/plural
pub fn format_count(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Relative size change from `before` to `after`, e.g. `-42.0%`.
pub fn format_change(before: u64, after: u64) -> String {
    if before == 0 {
        return "n/a".to_string();
    }
    let change = (after as f64 - before as f64) / before as f64 * 100.0;
    format!("{:+.1}%", change)
}

/// One row of a results table.
#[derive(Debug, Clone)]
pub struct Row {
    /// Output file name
    pub name: String,
    /// Output pixel size, e.g. `800x600`
    pub dimensions: String,
    /// Input size in bytes
    pub before: u64,
    /// Output size in bytes
    pub after: u64,
    /// Trailing note, e.g. a format fallback
    pub note: Option<String>,
}

/// Print rows as an aligned table.
pub fn print_table(rows: &[Row]) {
    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0).max(4);
    println!(
        "  {:<width$}  {:>11}  {:>10}  {:>10}  {:>7}",
        "FILE".bold(),
        "SIZE".bold(),
        "BEFORE".bold(),
        "AFTER".bold(),
        "CHANGE".bold(),
        width = width
    );
    for row in rows {
        let change = format_change(row.before, row.after);
        print!(
            "  {:<width$}  {:>11}  {:>10}  {:>10}  ",
            row.name,
            row.dimensions,
            format_size(row.before),
            format_size(row.after),
            width = width
        );
        if row.after <= row.before {
            print!("{:>7}", change.green());
        } else {
            print!("{:>7}", change.yellow());
        }
        match &row.note {
            Some(note) => println!("  {}", note.dimmed()),
            None => println!(),
        }
    }
}
