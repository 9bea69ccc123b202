//! Notification rules and delivery

mod engine;
mod rules;

pub use engine::*;
pub use rules::*;
