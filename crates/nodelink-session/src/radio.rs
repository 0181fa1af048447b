use nodelink_coap::Codec;
use nodelink_frame::{Eui64, FragmentSender, RadioConfig};
use nodelink_transport::Publisher;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::listener::{ListenerMap, TargetKey};

/// Radio link through a gateway.
///
/// Outbound messages are fragmented and published as downlink commands.
/// Inbound traffic arrives through [`RadioLink::deliver`] and
/// [`RadioLink::deliver_mtu`], called by whatever decodes gateway uplinks.
pub struct RadioLink<P> {
    sender: FragmentSender<P>,
    listeners: ListenerMap,
    codec: Codec,
}

impl<P: Publisher + 'static> RadioLink<P> {
    pub fn new(publisher: P, config: RadioConfig) -> Self {
        Self::with_codec(publisher, config, Codec::default())
    }

    pub fn with_codec(publisher: P, config: RadioConfig, codec: Codec) -> Self {
        Self {
            sender: FragmentSender::new(publisher, config),
            listeners: ListenerMap::new(),
            codec,
        }
    }

    pub fn config(&self) -> &RadioConfig {
        self.sender.config()
    }

    /// Decode a reassembled uplink from `addr` and route it.
    ///
    /// Returns `Ok(false)` if no session listens for that device.
    pub fn deliver(&self, addr: &str, data: &[u8]) -> Result<bool> {
        let target = self.resolve(addr)?;
        trace!(%target, len = data.len(), data = ?data, "rx radio message");
        let msg = self.codec.decode(data)?;
        Ok(self.listeners.dispatch_message(&self.target_key(&target), msg))
    }

    /// Route an MTU report for `addr`.
    pub fn deliver_mtu(&self, addr: &str, mtu: usize) -> Result<bool> {
        let target = self.resolve(addr)?;
        let delivered = self.listeners.dispatch_mtu(&self.target_key(&target), mtu);
        if !delivered {
            debug!(%target, mtu, "no session for mtu report");
        }
        Ok(delivered)
    }
}

impl<P: Publisher + 'static> Link for RadioLink<P> {
    type Target = Eui64;

    fn resolve(&self, addr: &str) -> Result<Eui64> {
        Eui64::parse(addr).map_err(|_| SessionError::InvalidAddress(addr.to_string()))
    }

    fn target_key(&self, target: &Eui64) -> TargetKey {
        TargetKey::rx(target.to_string())
    }

    fn listeners(&self) -> &ListenerMap {
        &self.listeners
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn send(&self, target: &Eui64, payload: &[u8], segment_size: usize) -> Result<()> {
        trace!(%target, len = payload.len(), data = ?payload, segment_size, "tx radio message");
        let segments = self.sender.send_fragmented(target, payload, segment_size)?;
        debug!(%target, segments, "radio message sent");
        Ok(())
    }

    fn min_mtu(&self) -> usize {
        self.config().min_mtu
    }

    fn mtu_in(&self) -> usize {
        let config = self.config();
        config.max_packet_in.saturating_sub(config.message_overhead)
    }

    fn mtu_out(&self, reported: usize) -> usize {
        let config = self.config();
        // Prefer a single segment when the data rate allows it.
        config
            .max_packet_out
            .max(reported)
            .saturating_sub(config.message_overhead)
    }
}
