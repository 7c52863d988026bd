//! Error kinds the startup routine needs to tell apart

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The local listener could not be bound. Fatal at startup.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
