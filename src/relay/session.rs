//! Relay Session

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Direction of one relay leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client to target
    Upstream,
    /// Target to client
    Downstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "client->target"),
            Direction::Downstream => write!(f, "target->client"),
        }
    }
}

/// How a single leg ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegOutcome {
    pub direction: Direction,
    pub bytes: u64,
    /// `None` when the source reached end-of-stream
    pub error: Option<String>,
}

impl LegOutcome {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// One forwarded connection pair. Owned by the relay task for its lifetime;
/// the two copy legs hold clones of the `Arc` only to update the counters.
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub target_addr: String,
    pub start_time: Instant,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
}

/// Summary emitted once both legs have ended and both connections are closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub target_addr: String,
    pub duration_ms: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_bytes: u64,
    pub upstream: LegOutcome,
    pub downstream: LegOutcome,
}

impl RelaySession {
    /// Create a new relay session
    pub fn new(client_addr: SocketAddr, target_addr: impl Into<String>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let target_addr = target_addr.into();
        debug!(
            "Creating new relay session: {} ({} -> {})",
            session_id, client_addr, target_addr
        );

        Self {
            session_id,
            client_addr,
            target_addr,
            start_time: Instant::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
        }
    }

    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Add bytes delivered in the given direction
    pub fn add_bytes(&self, direction: Direction, bytes: u64) {
        match direction {
            Direction::Upstream => self.bytes_up.fetch_add(bytes, Ordering::Relaxed),
            Direction::Downstream => self.bytes_down.fetch_add(bytes, Ordering::Relaxed),
        };
    }

    /// Bytes delivered so far in the given direction
    pub fn bytes(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Upstream => self.bytes_up(),
            Direction::Downstream => self.bytes_down(),
        }
    }

    /// Build the final report
    pub fn to_report(&self, upstream: LegOutcome, downstream: LegOutcome) -> SessionReport {
        SessionReport {
            session_id: self.session_id.clone(),
            client_addr: self.client_addr,
            target_addr: self.target_addr.clone(),
            duration_ms: self.duration().as_millis() as u64,
            bytes_up: self.bytes_up(),
            bytes_down: self.bytes_down(),
            total_bytes: self.total_bytes(),
            upstream,
            downstream,
        }
    }

    /// Log session statistics
    pub fn log_stats(&self, report: &SessionReport) {
        info!(
            session_id = %self.session_id,
            client_addr = %self.client_addr,
            target_addr = %self.target_addr,
            duration_ms = report.duration_ms,
            bytes_up = report.bytes_up,
            bytes_down = report.bytes_down,
            total_bytes = report.total_bytes,
            "Relay session closed"
        );

        for leg in [&report.upstream, &report.downstream] {
            if let Some(error) = &leg.error {
                warn!(
                    session_id = %self.session_id,
                    direction = %leg.direction,
                    bytes = leg.bytes,
                    "Leg ended with error: {}",
                    error
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(direction: Direction, bytes: u64) -> LegOutcome {
        LegOutcome {
            direction,
            bytes,
            error: None,
        }
    }

    #[test]
    fn test_byte_counters() {
        let session = RelaySession::new("127.0.0.1:12345".parse().unwrap(), "127.0.0.1:80");

        assert_eq!(session.total_bytes(), 0);

        session.add_bytes(Direction::Upstream, 1024);
        session.add_bytes(Direction::Upstream, 24);
        session.add_bytes(Direction::Downstream, 2048);

        assert_eq!(session.bytes(Direction::Upstream), 1048);
        assert_eq!(session.bytes(Direction::Downstream), 2048);
        assert_eq!(session.total_bytes(), 3096);
    }

    #[test]
    fn test_report() {
        let client_addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        let session = RelaySession::new(client_addr, "10.0.0.1:9100");
        session.add_bytes(Direction::Upstream, 4);
        session.add_bytes(Direction::Downstream, 4);

        let downstream = LegOutcome {
            direction: Direction::Downstream,
            bytes: 4,
            error: Some("connection reset by peer".to_string()),
        };
        let report = session.to_report(clean(Direction::Upstream, 4), downstream);

        assert_eq!(report.session_id, session.session_id);
        assert_eq!(report.client_addr, client_addr);
        assert_eq!(report.target_addr, "10.0.0.1:9100");
        assert_eq!(report.total_bytes, 8);
        assert!(report.upstream.is_clean());
        assert!(!report.downstream.is_clean());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let a = RelaySession::new(addr, "t:1");
        let b = RelaySession::new(addr, "t:1");
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Upstream.to_string(), "client->target");
        assert_eq!(Direction::Downstream.to_string(), "target->client");
    }
}
