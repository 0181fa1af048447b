/// Errors that can occur in port and publish operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the port.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A writer panicked while holding the publish lock.
    #[error("publisher lock poisoned")]
    Poisoned,

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
