//! Byte-port and publish primitives.
//!
//! This is the lowest layer of nodelink. It does not drive physical devices
//! itself; it wraps whatever stream the host hands over (a TCP connection to a
//! serial server, a Unix socket bridged to a tty, a gateway socket) behind the
//! [`Port`] and [`Publisher`] abstractions the framing layers build on.

pub mod error;
pub mod publish;
pub mod traits;

pub use error::{Result, TransportError};
pub use publish::{Publisher, StreamPublisher};
pub use traits::{Port, PortStream};
