//! portfwd Library
//!
//! TCP port forwarder: accepts connections on a local port and relays every
//! byte, unmodified and in both directions, to a fixed remote address.

pub mod config;
pub mod connection;
pub mod error;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::Forwarder;
pub use error::ForwardError;
pub use relay::RelayEngine;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the forwarder
pub type Result<T> = anyhow::Result<T>;
