//! Request/response transport for embedded nodes over constrained links.
//!
//! nodelink encodes compact request/response messages, frames them for a
//! line-oriented serial port or fragments them for a radio gateway, and
//! matches responses to requests per target session.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte ports and publish primitives
//! - [`coap`] - Message codec and option registry
//! - [`frame`] - Serial framing and radio fragmentation
//! - [`session`] - Sessions, listener dispatch and links (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use nodelink_transport::*;
}

/// Re-export codec types.
pub mod coap {
    pub use nodelink_coap::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nodelink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use nodelink_session::*;
}
