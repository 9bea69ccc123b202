//! Shared utilities for the FinGuard session agent
//!
//! This crate provides:
//! - ID types (NotificationId)
//! - Time utilities (monotonic time, wall-clock windows, countdown formatting)
//! - The session error taxonomy shared by every component
//! - Default paths for config, data, and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
