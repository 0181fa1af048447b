use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A byte-oriented, blocking, full-duplex port.
///
/// The serial frame layer reads from one handle and writes through another,
/// so implementors must be able to hand out an independent clone of the
/// underlying descriptor.
pub trait Port: Read + Write + Send + Sized + 'static {
    /// Set the idle timeout applied to blocking reads. `None` blocks forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Clone the port into a second handle over the same descriptor.
    fn try_clone_port(&self) -> Result<Self>;

    /// Drop any bytes already queued on the input side.
    fn discard_input(&mut self) -> Result<()>;
}

/// A connected port stream - implements Read + Write.
///
/// Wraps a TCP connection (serial-over-network servers, gateways) or, on
/// Unix, a local stream socket.
pub struct PortStream {
    inner: PortStreamInner,
}

enum PortStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for PortStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            PortStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for PortStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            PortStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            PortStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl PortStream {
    /// Connect to a TCP endpoint, e.g. a serial server or a radio gateway.
    pub fn connect_tcp(endpoint: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let stream = TcpStream::connect(&endpoint).map_err(|source| TransportError::Connect {
            endpoint: format!("{endpoint:?}"),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!(?endpoint, "connected tcp port");
        Ok(Self::from_tcp(stream))
    }

    /// Connect to a Unix stream socket at `path`.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            TransportError::Connect {
                endpoint: path.display().to_string(),
                source,
            }
        })?;
        debug!(?path, "connected unix port");
        Ok(Self::from_unix(stream))
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: PortStreamInner::Tcp(stream),
        }
    }

    /// Wrap an already-connected Unix stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: PortStreamInner::Unix(stream),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            PortStreamInner::Tcp(stream) => stream.set_nonblocking(nonblocking).map_err(Into::into),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => {
                stream.set_nonblocking(nonblocking).map_err(Into::into)
            }
        }
    }
}

impl Port for PortStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            PortStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    fn try_clone_port(&self) -> Result<Self> {
        match &self.inner {
            PortStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            PortStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let mut discarded = 0usize;
        let outcome = loop {
            match self.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) => break Err(TransportError::Io(err)),
            }
        };
        self.set_nonblocking(false)?;
        if discarded > 0 {
            debug!(discarded, "discarded stale port input");
        }
        outcome
    }
}

impl std::fmt::Debug for PortStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            PortStreamInner::Tcp(stream) => f
                .debug_struct("PortStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            PortStreamInner::Unix(_) => f.debug_struct("PortStream").field("type", &"unix").finish(),
        }
    }
}
