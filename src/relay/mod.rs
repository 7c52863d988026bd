//! Data Relay Module
//!
//! Dials the target for each accepted client and relays data in both
//! directions until both legs have ended.

pub mod engine;
pub mod session;

pub use engine::{copy_leg, RelayEngine, SessionOutcome};
pub use session::{Direction, LegOutcome, RelaySession, SessionReport};
