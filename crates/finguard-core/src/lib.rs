//! Session continuity core for the FinGuard session agent
//!
//! This crate contains:
//! - Credential renewal scheduling with single-flight refresh and backoff
//! - The idle timeout state machine (Active -> Warning -> Expired)
//! - The notification engine (rules, quiet hours, history, toasts)
//! - The session runtime that wires the three together
//!
//! Every component owns its timers in a [`TimerRegistry`] and publishes
//! typed events on its own [`EventBus`].

mod bus;
mod credential;
mod idle;
mod notify;
mod session;
mod timers;

pub use bus::*;
pub use credential::*;
pub use idle::*;
pub use notify::*;
pub use session::*;
pub use timers::*;
