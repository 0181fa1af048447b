use std::fmt;

use nodelink_coap::Codec;

use crate::error::Result;
use crate::listener::{ListenerMap, TargetKey};

/// A shared physical link that sessions transmit over.
///
/// The link owns the dispatch map its inbound side feeds and the codec used
/// in both directions.
pub trait Link: Send + Sync + 'static {
    /// Resolved form of a target address.
    type Target: Clone + fmt::Display + Send + Sync + 'static;

    /// Normalize a configured address. Malformed input is
    /// [`SessionError::InvalidAddress`](crate::SessionError::InvalidAddress).
    fn resolve(&self, addr: &str) -> Result<Self::Target>;

    /// Dispatch key under which inbound traffic for `target` is routed.
    fn target_key(&self, target: &Self::Target) -> TargetKey;

    fn listeners(&self) -> &ListenerMap;

    fn codec(&self) -> &Codec;

    /// Send one encoded message. `segment_size` bounds each on-air unit on
    /// links that fragment.
    fn send(&self, target: &Self::Target, payload: &[u8], segment_size: usize) -> Result<()>;

    /// MTU used when neither the session nor the link reported one.
    fn min_mtu(&self) -> usize;

    /// Largest message payload the link accepts inbound.
    fn mtu_in(&self) -> usize;

    /// Largest message payload to send, given the last reported MTU
    /// (0 if none).
    fn mtu_out(&self, reported: usize) -> usize;
}
