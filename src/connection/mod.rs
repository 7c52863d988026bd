//! Connection Module
//!
//! Binds the local listener and dispatches each accepted connection to a
//! relay task.

pub mod listener;

pub use listener::Forwarder;
