//! Structured logging setup for Parlor.
//!
//! Console output plus optional daily-rolling NDJSON files, filtered by the
//! configured level or `RUST_LOG`.

pub mod logger;

pub use logger::{build_filter, init_logger};
