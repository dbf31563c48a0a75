//! Fogsim Core - Shared types and errors
//!
//! This crate defines the value types used across:
//! - fogsim-engine (the simulator)
//! - fogsim-cli (the benchmarking binary)
//!
//! Key types:
//! - Device / task identifiers and 2D positions
//! - ResourceStatus snapshots and load buckets
//! - Error types

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
