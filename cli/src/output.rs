//! Output formatting utilities for CLI commands

use colored::Colorize;

/// Print success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Section heading for tabular output
pub fn heading(msg: &str) -> String {
    msg.bold().to_string()
}

/// Colour a signed duration delta: slower is red, faster is green
pub fn delta(value: f64, formatted: String) -> String {
    if value > 0.0 {
        formatted.red().to_string()
    } else if value < 0.0 {
        formatted.green().to_string()
    } else {
        formatted
    }
}
