//! Shared types for the FinGuard session agent
//!
//! This crate defines the stable surface between the session components and
//! whatever embeds them:
//! - Notification records, settings and presentation rules
//! - Events published by each component
//! - Commands accepted from the UI
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
