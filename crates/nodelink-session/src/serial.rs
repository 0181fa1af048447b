use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use nodelink_coap::Codec;
use nodelink_frame::{FrameError, SerialConfig, SerialFrameReader, SerialFrameWriter};
use nodelink_transport::{Port, TransportError};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::listener::{ListenerMap, TargetKey};

/// The only target a serial link can reach: the device on the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialTarget;

impl fmt::Display for SerialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("serial")
    }
}

/// Serial link over a byte port.
///
/// A background thread owns the read half: it reassembles frames, decodes
/// them and routes every message to the single serial listener. Writers
/// share the write half under a lock.
pub struct SerialLink<P: Port> {
    writer: Mutex<SerialFrameWriter<P>>,
    listeners: Arc<ListenerMap>,
    codec: Codec,
    config: SerialConfig,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Port> SerialLink<P> {
    /// Start a link over `port` with the default codec.
    pub fn open(port: P, config: SerialConfig) -> Result<Arc<Self>> {
        Self::with_codec(port, config, Codec::default())
    }

    /// Start a link with an explicit codec.
    ///
    /// Stale input is discarded before the reader starts.
    pub fn with_codec(mut port: P, config: SerialConfig, codec: Codec) -> Result<Arc<Self>> {
        port.discard_input()?;
        let reader = SerialFrameReader::with_config_port(port.try_clone_port()?, config.clone())?;

        let listeners = Arc::new(ListenerMap::new());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let listeners = Arc::clone(&listeners);
            let stop = Arc::clone(&stop);
            let codec = codec.clone();
            thread::Builder::new()
                .name("nodelink-serial-rx".into())
                .spawn(move || run_reader(reader, codec, listeners, stop))
                .map_err(TransportError::Io)?
        };

        info!(mtu = config.mtu, "serial link started");
        Ok(Arc::new(Self {
            writer: Mutex::new(SerialFrameWriter::with_config(port, config.clone())),
            listeners,
            codec,
            config,
            stop,
            reader: Mutex::new(Some(handle)),
        }))
    }

    /// Stop the reader thread and wait for it.
    ///
    /// The reader notices the request after its current receive returns,
    /// so this can take up to the configured read timeout.
    pub fn shutdown(&self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        let handle = self.reader.lock().map_err(|_| SessionError::Poisoned)?.take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| SessionError::Poisoned)?;
            debug!("serial reader joined");
        }
        Ok(())
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn key() -> TargetKey {
        TargetKey::new("serial", "rx")
    }
}

impl<P: Port> Drop for SerialLink<P> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn run_reader<R: Read>(
    mut reader: SerialFrameReader<R>,
    codec: Codec,
    listeners: Arc<ListenerMap>,
    stop: Arc<AtomicBool>,
) {
    let key = TargetKey::new("serial", "rx");
    while !stop.load(Ordering::Acquire) {
        let frame = match reader.receive() {
            Ok(frame) => frame,
            Err(FrameError::Timeout(_)) => continue,
            Err(FrameError::ConnectionClosed) => {
                info!("serial port closed");
                break;
            }
            Err(FrameError::Io(err)) => {
                warn!(error = %err, "serial read failed");
                break;
            }
            Err(err) => {
                debug!(error = %err, "dropping serial frame");
                continue;
            }
        };

        trace!(len = frame.len(), data = ?frame, "rx serial frame");
        match codec.decode(&frame) {
            Ok(msg) => {
                listeners.dispatch_message(&key, msg);
            }
            Err(err) => debug!(error = %err, "dropping undecodable frame"),
        }
    }
    debug!("serial reader exiting");
}

impl<P: Port> Link for SerialLink<P> {
    type Target = SerialTarget;

    fn resolve(&self, _addr: &str) -> Result<SerialTarget> {
        Ok(SerialTarget)
    }

    fn target_key(&self, _target: &SerialTarget) -> TargetKey {
        Self::key()
    }

    fn listeners(&self) -> &ListenerMap {
        &self.listeners
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn send(&self, _target: &SerialTarget, payload: &[u8], _segment_size: usize) -> Result<()> {
        trace!(len = payload.len(), data = ?payload, "tx serial frame");
        let mut writer = self.writer.lock().map_err(|_| SessionError::Poisoned)?;
        writer.send(payload)?;
        Ok(())
    }

    fn min_mtu(&self) -> usize {
        self.config.mtu
    }

    fn mtu_in(&self) -> usize {
        self.config.mtu
    }

    fn mtu_out(&self, _reported: usize) -> usize {
        self.config.mtu
    }
}
