//! Backend interfaces for the FinGuard session agent
//!
//! [`ApiTransport`] is the seam between the session components and the
//! network. [`HttpTransport`] talks to the real backend, [`MockTransport`]
//! replays scripted responses in tests, and [`FinanceApi`] wraps either one
//! with typed endpoint calls.

mod client;
mod http;
mod mock;
mod transport;
mod wire;

pub use client::*;
pub use http::*;
pub use mock::*;
pub use transport::*;
pub use wire::*;
