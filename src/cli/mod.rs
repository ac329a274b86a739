//! Terminal helpers for the binary

pub mod output;
pub mod spinner;

pub use output::Printer;
pub use spinner::WaitSpinner;
