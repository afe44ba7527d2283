use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};

use crate::error::Result;

/// Capabilities a duplex link needs from its byte-stream connection.
///
/// Clones returned by [`try_clone`](Connection::try_clone) refer to the same
/// underlying socket, so shutting down any clone interrupts blocked I/O on
/// all of them.
pub trait Connection: Read + Write + Send + Sync + Sized + 'static {
    /// Create another handle to the same connection.
    fn try_clone(&self) -> std::io::Result<Self>;

    /// Shut down both directions of the connection.
    ///
    /// Blocked reads return end-of-stream and subsequent writes fail.
    fn shutdown(&self) -> std::io::Result<()>;

    /// Static transport identifier for diagnostics ("tcp", "unix").
    fn transport_name(&self) -> &'static str;
}

/// A connected TCP or Unix byte stream.
///
/// Wraps a TCP stream, or a Unix domain stream socket on Unix platforms.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl From<std::net::TcpStream> for LinkStream {
    fn from(stream: std::net::TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for LinkStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }
}

impl LinkStream {
    /// Create a connected pair of Unix stream sockets.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((left.into(), right.into()))
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Remote address for TCP streams, `None` for Unix sockets.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.peer_addr().ok(),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => None,
        }
    }

    /// Disable Nagle's algorithm on TCP streams. No-op for Unix sockets.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_nodelay(nodelay).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => Ok(()),
        }
    }
}

impl Connection for LinkStream {
    fn try_clone(&self) -> std::io::Result<Self> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.try_clone().map(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.try_clone().map(Into::into),
        }
    }

    fn shutdown(&self) -> std::io::Result<()> {
        let result = match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        // The peer may have torn the socket down first.
        match result {
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn transport_name(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => f
                .debug_struct("LinkStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => f.debug_struct("LinkStream").field("type", &"unix").finish(),
        }
    }
}
