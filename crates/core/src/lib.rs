//! Core utilities shared by the multitool crates
//!
//! - **Error handling**: errors with codes, context, and recovery suggestions
//! - **Configuration**: TOML-based configuration with serde defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use multitool_core::config::Config;
//!
//! let config = Config::load(None).expect("config");
//! println!("default quality: {}", config.schema.resize.quality);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

pub use error::{exit_codes, Error, ErrorCode, ErrorReport, Result, ResultExt};
