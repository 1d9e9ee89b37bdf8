//! Shared Strategy Framework
//!
//! Common utilities and traits for candle-driven signal strategies:
//! configuration loading, the long-running strategy trait and the
//! lock-free metrics collector that doubles as the engine heartbeat.

pub mod config;
pub mod metrics;
pub mod traits;

pub use config::*;
pub use metrics::*;
pub use traits::*;
