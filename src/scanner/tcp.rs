//! TCP connect implementation of [`Connector`].
//!
//! Uses the operating system's socket API to complete a full handshake,
//! then optionally reads one banner. Requires no special privileges.

use crate::banner::read_banner;
use crate::error::AttemptError;
use crate::scanner::traits::{Connector, Outcome, Timeouts};
use crate::types::Port;
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// TCP connect connector.
///
/// The stream is owned by a single `connect` call and dropped before it
/// returns, so the socket is closed on every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a new TCP connector.
    pub fn new() -> Self {
        Self
    }

    /// Attempt the handshake within `deadline`.
    async fn attempt_connect(
        addr: SocketAddr,
        deadline: std::time::Duration,
    ) -> Result<TcpStream, AttemptError> {
        match timeout(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(classify_connect_error(e)),
            Err(_) => Err(AttemptError::ConnectTimeout),
        }
    }
}

/// EHOSTUNREACH / ENETUNREACH on Linux, the BSDs and macOS, then their
/// Winsock counterparts.
const UNREACHABLE_OS_CODES: [i32; 6] = [113, 101, 65, 51, 10065, 10051];

/// Sort a failed connect into refusal, unreachability or a plain I/O fault.
fn classify_connect_error(e: io::Error) -> AttemptError {
    match e.kind() {
        ErrorKind::ConnectionRefused => AttemptError::ConnectRefused,
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => AttemptError::Unreachable(e),
        _ if e
            .raw_os_error()
            .is_some_and(|code| UNREACHABLE_OS_CODES.contains(&code)) =>
        {
            AttemptError::Unreachable(e)
        }
        _ => AttemptError::Io(e),
    }
}

/// Map a failed handshake to the outcome reported for the port.
fn failed_outcome(addr: SocketAddr, err: AttemptError) -> Outcome {
    match err {
        AttemptError::ConnectRefused => Outcome::Closed,
        AttemptError::ConnectTimeout => Outcome::Filtered,
        AttemptError::Unreachable(e) => {
            trace!(%addr, error = %e, "destination unreachable");
            Outcome::Filtered
        }
        e => {
            trace!(%addr, error = %e, "connect failed");
            Outcome::Error {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: IpAddr, port: Port, timeouts: Timeouts) -> Outcome {
        let addr = SocketAddr::new(address, port.as_u16());

        let mut stream = match Self::attempt_connect(addr, timeouts.connect).await {
            Ok(stream) => stream,
            Err(e) => return failed_outcome(addr, e),
        };

        let banner = match timeouts.read {
            Some(read_timeout) => match read_banner(&mut stream, read_timeout).await {
                Ok(banner) => Some(banner),
                Err(e) => {
                    debug!(%addr, reason = %e, "open port without banner");
                    None
                }
            },
            None => None,
        };
        drop(stream);

        Outcome::Open { banner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// A port on localhost with nothing listening.
    async fn unused_port() -> Port {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Port::new(port).unwrap()
    }

    fn discard_addr() -> SocketAddr {
        SocketAddr::new(LOCALHOST, 9)
    }

    #[tokio::test]
    async fn test_refused_connect_is_closed() {
        let port = unused_port().await;
        let timeouts = Timeouts {
            connect: Duration::from_millis(300),
            read: Some(Duration::from_millis(300)),
        };

        let start = Instant::now();
        let outcome = TcpConnector::new().connect(LOCALHOST, port, timeouts).await;

        assert_eq!(outcome, Outcome::Closed);
        assert!(start.elapsed() < timeouts.connect + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unanswered_connect_is_filtered_within_deadline() {
        // TEST-NET-1 (RFC 5737): either dropped silently or unroutable.
        let blackhole = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let timeouts = Timeouts {
            connect: Duration::from_millis(300),
            read: Some(Duration::from_millis(300)),
        };

        let start = Instant::now();
        let outcome = TcpConnector::new()
            .connect(blackhole, Port::new(81).unwrap(), timeouts)
            .await;

        assert_eq!(outcome, Outcome::Filtered);
        assert!(start.elapsed() < timeouts.connect + Duration::from_millis(200));
    }

    #[test]
    fn test_unreachable_errors_are_filtered() {
        for err in [
            io::Error::from(ErrorKind::HostUnreachable),
            io::Error::from(ErrorKind::NetworkUnreachable),
            io::Error::from_raw_os_error(113),
            io::Error::from_raw_os_error(101),
        ] {
            let classified = classify_connect_error(err);
            assert!(matches!(classified, AttemptError::Unreachable(_)));
            assert_eq!(failed_outcome(discard_addr(), classified), Outcome::Filtered);
        }
    }

    #[test]
    fn test_error_text_does_not_decide_the_outcome() {
        let err = io::Error::new(ErrorKind::Other, "unreachable code path hit");
        let outcome = failed_outcome(discard_addr(), classify_connect_error(err));
        assert!(matches!(outcome, Outcome::Error { .. }));

        let refused = io::Error::from(ErrorKind::ConnectionRefused);
        assert_eq!(failed_outcome(discard_addr(), classify_connect_error(refused)), Outcome::Closed);
        assert_eq!(failed_outcome(discard_addr(), AttemptError::ConnectTimeout), Outcome::Filtered);
    }

    #[tokio::test]
    async fn test_silent_listener_is_open_without_banner() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = Port::new(listener.local_addr().unwrap().port()).unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let timeouts = Timeouts {
            connect: Duration::from_millis(500),
            read: Some(Duration::from_millis(200)),
        };
        let start = Instant::now();
        let outcome = TcpConnector::new().connect(LOCALHOST, port, timeouts).await;

        assert_eq!(outcome, Outcome::open());
        assert!(start.elapsed() < Duration::from_millis(200 + 500));
        server.abort();
    }

    #[tokio::test]
    async fn test_greeting_listener_yields_banner() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = Port::new(listener.local_addr().unwrap().port()).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 ftp.local ready\r\n").await.unwrap();
        });

        let outcome = TcpConnector::new()
            .connect(LOCALHOST, port, Timeouts::default())
            .await;

        assert_eq!(
            outcome,
            Outcome::Open {
                banner: Some("220 ftp.local ready".into())
            }
        );
    }

    #[tokio::test]
    async fn test_banner_read_disabled() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = Port::new(listener.local_addr().unwrap().port()).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"hello\r\n").await;
        });

        let timeouts = Timeouts {
            connect: Duration::from_millis(500),
            read: None,
        };
        let outcome = TcpConnector::new().connect(LOCALHOST, port, timeouts).await;
        assert_eq!(outcome, Outcome::open());
    }
}
