//! Verbose, timestamped console logging on top of the `log` crate's levels.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::utilities::printer::{Printer, PrinterColor};

/// Logger with optional verbose console output and timestamps. Every call
/// also goes through `log::log!` at the matching level regardless of
/// `verbose`, so a host application's own `env_logger`/subscriber still sees
/// it even when the colored console echo is off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub verbose: bool,
    #[serde(default = "default_color")]
    pub default_color: PrinterColor,
    #[serde(skip)]
    printer: Printer,
}

fn default_color() -> PrinterColor {
    PrinterColor::BoldYellow
}

impl Default for Logger {
    fn default() -> Self {
        Self { verbose: false, default_color: PrinterColor::BoldYellow, printer: Printer::default() }
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose, default_color: PrinterColor::BoldYellow, printer: Printer::default() }
    }

    /// Logs `message` at `level` ("info"/"warning"/"error"/"debug"). Always
    /// forwards to the `log` crate; additionally echoes a colored,
    /// timestamped line to the console when `verbose` is set.
    pub fn log(&self, level: &str, message: &str, color: Option<PrinterColor>) {
        match level.to_lowercase().as_str() {
            "error" => log::error!("{message}"),
            "warning" | "warn" => log::warn!("{message}"),
            "debug" => log::debug!("{message}"),
            _ => log::info!("{message}"),
        }

        if self.verbose {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            let color = color.unwrap_or(self.default_color);
            let formatted = format!("\n[{}][{}]: {}", timestamp, level.to_uppercase(), message);
            self.printer.print(&formatted, color);
        }
    }
}
