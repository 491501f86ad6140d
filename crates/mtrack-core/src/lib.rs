//! mtrack-core library.
//!
//! Turns sparse machine ON/OFF interval logs into a dense, hour-bucketed
//! position timeline.
//!
//! # Layout
//!
//! - [`bucket`]: hour-bucket arithmetic.
//! - [`clock`]: local-clock parsing and rendering.
//! - [`model`]: interval and resolved-row types.
//! - [`input`]: CSV loading into an immutable [`input::IntervalTable`].
//! - [`resolve`]: the interval resolver (pull-based iterator).
//! - [`aggregate`]: collapses rows sharing an hour bucket.
//! - [`route`]: per-id / per-date / combined CSV destinations.
//! - [`pipeline`]: wires the pieces together for one grouping mode.
//! - [`config`], [`lock`], [`timing`], [`error`]: layered settings, the
//!   output-directory lock, stage timing and stable error codes.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at module seams, each mapping to an
//!   [`error::ErrorCode`]; `anyhow::Result` for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod aggregate;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod lock;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod route;
pub mod timing;
