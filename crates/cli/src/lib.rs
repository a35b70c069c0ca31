//! Terminal helpers for the multitool binaries
//!
//! - Status lines and headers
//! - Spinners and progress bars for batch work
//! - Size, duration and change formatting plus a results table

#![warn(missing_docs)]

pub mod output;
pub mod progress;
