//! Request volume and latency statistics over sliding time windows.
//!
//! [`Benchmarks`] keeps one aggregate per second for a bounded retention
//! horizon and answers [`Snapshot`]s for any trailing window.
//! [`BenchmarksMiddleware`] feeds it from an actix-web app, and [`report`]
//! exposes the numbers over HTTP.

pub mod benchmarks;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod report;

pub use benchmarks::{Benchmarks, Snapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BenchmarksConfig, ServerConfig};
pub use error::ConfigError;
pub use middleware::BenchmarksMiddleware;
