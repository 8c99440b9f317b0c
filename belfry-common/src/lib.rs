//! # Belfry Common Library
//!
//! Shared code for the belfry automation daemon:
//! - Weekly-schedule data model with JSON persistence
//! - Configuration document (volumes, radio, holidays, TTS)
//! - Event types (BelfryEvent enum) and broadcast bus
//! - Time-of-day type and wall-clock helpers
//! - Data-folder layout resolution

pub mod config;
pub mod error;
pub mod events;
pub mod paths;
pub mod schedule;
pub mod time;

pub use error::{Error, Result};
pub use time::TimeOfDay;
