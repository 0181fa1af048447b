use std::io::{ErrorKind, Write};
use std::sync::Mutex;

use tracing::trace;

use crate::error::{Result, TransportError};

/// A publish primitive: hands one opaque, already-addressed message to the
/// link (e.g. a radio gateway command socket).
///
/// Implementations must deliver each call atomically; concurrent callers may
/// not interleave bytes of different messages.
pub trait Publisher: Send + Sync {
    /// Publish one message.
    fn publish(&self, data: &[u8]) -> Result<()>;
}

impl<F> Publisher for F
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync,
{
    fn publish(&self, data: &[u8]) -> Result<()> {
        self(data)
    }
}

/// Publishes messages by writing them to a shared stream under a lock.
pub struct StreamPublisher<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> StreamPublisher<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Consume the publisher and return the inner writer.
    pub fn into_inner(self) -> Result<W> {
        self.inner.into_inner().map_err(|_| TransportError::Poisoned)
    }
}

impl<W: Write + Send> Publisher for StreamPublisher<W> {
    fn publish(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TransportError::Poisoned)?;
        trace!(len = data.len(), "publishing");

        let mut offset = 0usize;
        while offset < data.len() {
            match inner.write(&data[offset..]) {
                Ok(0) => return Err(TransportError::Shutdown),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn stream_publisher_writes_whole_messages() {
        let publisher = StreamPublisher::new(Vec::<u8>::new());
        publisher.publish(b"first\n").unwrap();
        publisher.publish(b"second\n").unwrap();

        let written = publisher.into_inner().unwrap();
        assert_eq!(written, b"first\nsecond\n");
    }

    #[test]
    fn closure_acts_as_publisher() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let publisher = move |data: &[u8]| -> Result<()> {
            sink.lock().unwrap().push(data.to_vec());
            Ok(())
        };

        publisher.publish(b"one").unwrap();
        publisher.publish(b"two").unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn zero_length_write_is_shutdown() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let publisher = StreamPublisher::new(Closed);
        let err = publisher.publish(b"data").unwrap_err();
        assert!(matches!(err, TransportError::Shutdown));
    }
}
