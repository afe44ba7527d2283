use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// TCP listener producing [`LinkStream`] connections.
///
/// Only the minimum needed to hand a live connection to a duplex link:
/// bind, accept, connect. No reconnect or backoff policy lives here.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on the given address.
    ///
    /// Port `0` picks an ephemeral port; see [`local_addr`](Self::local_addr).
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::bind(&addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(stream.into())
    }

    /// Connect to a listening TCP endpoint (blocking).
    ///
    /// Every resolved address is tried in order; the last error is returned
    /// when none accepts.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<LinkStream> {
        Self::connect_inner(&addr, None)
    }

    /// Connect with a per-address connect timeout.
    pub fn connect_timeout(
        addr: impl ToSocketAddrs + std::fmt::Display,
        timeout: Duration,
    ) -> Result<LinkStream> {
        Self::connect_inner(&addr, Some(timeout))
    }

    fn connect_inner(
        addr: &(impl ToSocketAddrs + std::fmt::Display),
        timeout: Option<Duration>,
    ) -> Result<LinkStream> {
        let mut last_err = None;
        for resolved in addr.to_socket_addrs()? {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&resolved, timeout),
                None => TcpStream::connect(resolved),
            };
            match attempt {
                Ok(stream) => {
                    debug!(addr = %resolved, "connected to tcp endpoint");
                    return Ok(stream.into());
                }
                Err(err) => last_err = Some(TransportError::connect(resolved, err)),
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Unresolved(addr.to_string())))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Connection;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(server.transport_name(), "tcp");
        assert!(server.peer_addr().is_some());

        handle.join().unwrap();
    }

    #[test]
    fn test_nodelay_on_both_ends() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = TcpTransport::connect(listener.local_addr()).unwrap();
        let server = listener.accept().unwrap();

        client.set_nodelay(true).unwrap();
        server.set_nodelay(true).unwrap();
        server.set_nodelay(false).unwrap();
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to obtain a port nobody listens on.
        let addr = TcpTransport::bind("127.0.0.1:0").unwrap().local_addr();
        let result = TcpTransport::connect_timeout(addr, Duration::from_millis(200));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_bind_in_use() {
        let first = TcpTransport::bind("127.0.0.1:0").unwrap();
        let result = TcpTransport::bind(first.local_addr());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_shutdown_wakes_blocked_tcp_read() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let client = std::thread::spawn(move || TcpTransport::connect(addr).unwrap());
        let server = listener.accept().unwrap();
        let _client = client.join().unwrap();

        let mut reader = server.try_clone().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(20));
        server.shutdown().unwrap();
        let read = handle.join().unwrap();
        assert!(matches!(read, Ok(0)) || read.is_err());
    }
}
