pub mod logger;
pub mod printer;

pub use logger::Logger;
pub use printer::{ColoredText, Printer, PrinterColor};
