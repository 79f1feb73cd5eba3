//! Core utilities and common types for Pentarchy.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{Config, LoggingConfig};
pub use error::{Error, Result};
pub use types::*;
