//! Sessions over shared nodelink links.
//!
//! A [`Link`] (serial port or radio gateway) carries traffic for many
//! [`Session`]s. Inbound messages are routed by target through a
//! [`ListenerMap`]; each session drains its own [`Listener`] and hands
//! messages to a [`Transceiver`] that matches them to the one outstanding
//! request.

pub mod config;
pub mod error;
pub mod link;
pub mod listener;
pub mod radio;
pub mod serial;
pub mod session;
pub mod transceiver;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use link::Link;
pub use listener::{Listener, ListenerMap, TargetKey, LISTENER_QUEUE_DEPTH};
pub use radio::RadioLink;
pub use serial::{SerialLink, SerialTarget};
pub use session::Session;
pub use transceiver::Transceiver;
