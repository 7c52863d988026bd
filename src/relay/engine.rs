//! Relay Engine

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::session::{Direction, LegOutcome, RelaySession, SessionReport};
use crate::config::Config;

/// Result of handling one accepted connection
#[derive(Debug)]
pub enum SessionOutcome {
    /// The target could not be reached; the inbound connection was closed
    DialFailed { target_addr: String, error: String },
    /// Both legs ran to completion and both connections were closed
    Completed(SessionReport),
}

/// Dials the fixed target and relays data between it and each client
#[derive(Debug, Clone)]
pub struct RelayEngine {
    target_addr: Arc<str>,
    buffer_size: usize,
}

/// Smallest copy buffer a relay leg will use
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Both halves of a finished leg, handed back with its outcome
pub type LegResult<R, W> = (R, W, LegOutcome);

impl RelayEngine {
    /// Create a new relay engine for `target_addr` (`host:port`).
    /// `buffer_size` is raised to at least `MIN_BUFFER_SIZE`.
    pub fn new(target_addr: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            target_addr: Arc::from(target_addr.into()),
            buffer_size: buffer_size.max(MIN_BUFFER_SIZE),
        }
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.target_addr(), config.forward.buffer_size)
    }

    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Single dial attempt to the target. Every address the host resolves to
    /// is tried in turn before giving up.
    pub async fn connect_to_target(&self) -> io::Result<TcpStream> {
        debug!("Attempting to connect to target: {}", self.target_addr);
        TcpStream::connect(&*self.target_addr).await
    }

    /// Handle one accepted client connection from dial to close.
    ///
    /// Both `client` and the outbound stream are owned here and dropped
    /// before this returns, on every path.
    pub async fn handle(&self, client: TcpStream, client_addr: SocketAddr) -> SessionOutcome {
        let remote = match self.connect_to_target().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    client_addr = %client_addr,
                    target_addr = %self.target_addr,
                    "Failed to connect to target: {}",
                    e
                );
                drop(client);
                return SessionOutcome::DialFailed {
                    target_addr: self.target_addr.to_string(),
                    error: e.to_string(),
                };
            }
        };

        let session = Arc::new(RelaySession::new(client_addr, self.target_addr.to_string()));
        info!(
            session_id = %session.session_id,
            client_addr = %client_addr,
            target_addr = %self.target_addr,
            "Relaying {} <--> {}",
            client_addr,
            self.target_addr
        );

        SessionOutcome::Completed(self.relay_data(session, client, remote).await)
    }

    /// Run both legs to completion, then close both connections
    pub async fn relay_data(
        &self,
        session: Arc<RelaySession>,
        client: TcpStream,
        remote: TcpStream,
    ) -> SessionReport {
        let (client_read, client_write) = client.into_split();
        let (remote_read, remote_write) = remote.into_split();

        let upstream = tokio::spawn(copy_leg(
            client_read,
            remote_write,
            self.buffer_size,
            Arc::clone(&session),
            Direction::Upstream,
        ));
        let downstream = tokio::spawn(copy_leg(
            remote_read,
            client_write,
            self.buffer_size,
            Arc::clone(&session),
            Direction::Downstream,
        ));

        // Draining: neither connection is closed until both legs report in.
        let (upstream, downstream) = tokio::join!(upstream, downstream);
        let (client_read, remote_write, upstream) =
            Self::collect_leg(&session, Direction::Upstream, upstream);
        let (remote_read, client_write, downstream) =
            Self::collect_leg(&session, Direction::Downstream, downstream);

        Self::close(&session, "client", client_read, client_write);
        Self::close(&session, "target", remote_read, remote_write);

        let report = session.to_report(upstream, downstream);
        session.log_stats(&report);
        report
    }

    fn collect_leg(
        session: &RelaySession,
        direction: Direction,
        joined: Result<LegResult<OwnedReadHalf, OwnedWriteHalf>, JoinError>,
    ) -> (Option<OwnedReadHalf>, Option<OwnedWriteHalf>, LegOutcome) {
        match joined {
            Ok((reader, writer, outcome)) => (Some(reader), Some(writer), outcome),
            Err(e) => {
                // The task's halves were dropped when it unwound.
                error!(
                    session_id = %session.session_id,
                    direction = %direction,
                    "Relay leg aborted: {}",
                    e
                );
                let outcome = LegOutcome {
                    direction,
                    bytes: session.bytes(direction),
                    error: Some(e.to_string()),
                };
                (None, None, outcome)
            }
        }
    }

    fn close(
        session: &RelaySession,
        side: &str,
        reader: Option<OwnedReadHalf>,
        writer: Option<OwnedWriteHalf>,
    ) {
        match (reader, writer) {
            (Some(reader), Some(writer)) => match reader.reunite(writer) {
                Ok(stream) => drop(stream),
                Err(e) => warn!(
                    session_id = %session.session_id,
                    "Mismatched {} halves on close: {}",
                    side,
                    e
                ),
            },
            // Any surviving half is the last owner of its socket.
            (reader, writer) => {
                drop(reader);
                drop(writer);
            }
        }
        debug!(session_id = %session.session_id, "Closed {} connection", side);
    }
}

/// Copy `reader` into `writer` until end-of-stream or the first I/O error.
///
/// A zero `buffer_size` is treated as one byte; an empty buffer would read
/// as end-of-stream.
///
/// On exit the write side of `writer` is shut down so the peer sees
/// end-of-stream, while the opposite leg keeps running. Both halves are
/// handed back so the caller decides when the sockets close.
pub async fn copy_leg<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    session: Arc<RelaySession>,
    direction: Direction,
) -> LegResult<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];

    let error = loop {
        let n = match reader.read(&mut buffer).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) => break Some(e),
        };
        if let Err(e) = writer.write_all(&buffer[..n]).await {
            break Some(e);
        }
        session.add_bytes(direction, n as u64);
    };

    if let Err(e) = writer.shutdown().await {
        debug!(
            session_id = %session.session_id,
            direction = %direction,
            "Half-close failed: {}",
            e
        );
    }

    match &error {
        None => debug!(session_id = %session.session_id, direction = %direction, "Leg reached end of stream"),
        Some(e) => debug!(session_id = %session.session_id, direction = %direction, "Leg ended: {}", e),
    }

    let outcome = LegOutcome {
        direction,
        bytes: session.bytes(direction),
        error: error.map(|e| e.to_string()),
    };
    (reader, writer, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn session() -> Arc<RelaySession> {
        Arc::new(RelaySession::new("127.0.0.1:40000".parse().unwrap(), "127.0.0.1:9100"))
    }

    #[tokio::test]
    async fn test_copy_leg_until_eof() {
        let session = session();
        let reader = Builder::new().read(b"hello ").read(b"world").build();
        let writer = Builder::new().write(b"hello ").write(b"world").build();

        let (_, _, outcome) =
            copy_leg(reader, writer, 1024, Arc::clone(&session), Direction::Upstream).await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.bytes, 11);
        assert_eq!(session.bytes_up(), 11);
        assert_eq!(session.bytes_down(), 0);
    }

    #[tokio::test]
    async fn test_copy_leg_read_error_counts_as_end() {
        let session = session();
        let reader = Builder::new()
            .read(b"ping")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let writer = Builder::new().write(b"ping").build();

        let (_, _, outcome) =
            copy_leg(reader, writer, 1024, Arc::clone(&session), Direction::Downstream).await;

        assert_eq!(outcome.direction, Direction::Downstream);
        assert_eq!(outcome.bytes, 4);
        assert!(outcome.error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_copy_leg_write_error_stops_leg() {
        let session = session();
        let reader = Builder::new().read(b"ping").build();
        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();

        let (_, _, outcome) =
            copy_leg(reader, writer, 1024, Arc::clone(&session), Direction::Upstream).await;

        assert!(!outcome.is_clean());
        assert_eq!(outcome.bytes, 0);
    }

    #[tokio::test]
    async fn test_copy_leg_respects_buffer_size() {
        let session = session();
        let payload = vec![7u8; 3000];
        let reader = Builder::new().read(&payload).build();
        let writer = Builder::new()
            .write(&payload[..1024])
            .write(&payload[1024..2048])
            .write(&payload[2048..])
            .build();

        let (_, _, outcome) =
            copy_leg(reader, writer, 1024, Arc::clone(&session), Direction::Upstream).await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.bytes, 3000);
    }

    #[test]
    fn test_buffer_size_has_a_floor() {
        assert_eq!(RelayEngine::new("127.0.0.1:80", 0).buffer_size(), MIN_BUFFER_SIZE);
        assert_eq!(RelayEngine::new("127.0.0.1:80", 16).buffer_size(), MIN_BUFFER_SIZE);
        assert_eq!(RelayEngine::new("127.0.0.1:80", 65536).buffer_size(), 65536);
    }

    #[tokio::test]
    async fn test_copy_leg_zero_buffer_still_copies() {
        let session = session();
        let reader = Builder::new().read(b"hi").build();
        let writer = Builder::new().write(b"h").write(b"i").build();

        let (_, _, outcome) =
            copy_leg(reader, writer, 0, Arc::clone(&session), Direction::Upstream).await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.bytes, 2);
    }

    #[tokio::test]
    async fn test_dial_failure_closes_client() {
        // Grab a free port and release it so the dial is refused.
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = closed.local_addr().unwrap();
        drop(closed);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (inbound, client_addr) = listener.accept().await.unwrap();

        let engine = RelayEngine::new(target.to_string(), 8192);
        let outcome = engine.handle(inbound, client_addr).await;
        assert!(matches!(outcome, SessionOutcome::DialFailed { .. }));

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }
}
