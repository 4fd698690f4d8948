//! # relay-cli
//!
//! Command-line interface for the task relay.
//!
//! ## Commands
//!
//! - `relay start`: Run the relay (WebSocket endpoint + HTTP bridge)
//! - `relay config`: Show the effective configuration
//! - `relay version`: Show version and build info

pub mod commands;

pub use commands::Cli;
