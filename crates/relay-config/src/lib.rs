//! # relay-config
//!
//! Configuration for the task relay. Reads from `relay.toml`, then applies
//! environment variable and CLI overrides, in that precedence order.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::RelayConfig;
pub use schema::{BridgeConfig, ConfigWarning, DispatchConfig, LoggingConfig, ServerConfig, WarningSeverity};
