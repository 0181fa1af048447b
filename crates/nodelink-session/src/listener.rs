use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use nodelink_coap::Message;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Inbound messages queued per listener before the reader starts dropping.
pub const LISTENER_QUEUE_DEPTH: usize = 16;

/// Dispatch key: a normalized target address plus the traffic kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    addr: String,
    kind: &'static str,
}

impl TargetKey {
    pub fn new(addr: impl Into<String>, kind: &'static str) -> Self {
        Self {
            addr: addr.into(),
            kind,
        }
    }

    /// Key for inbound traffic from `addr`.
    pub fn rx(addr: impl Into<String>) -> Self {
        Self::new(addr, "rx")
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.kind)
    }
}

/// Subscriber record for one target: a message queue, an MTU-update queue
/// and a close signal.
///
/// The link's reader is the only producer, the owning session's loop the
/// only consumer.
pub struct Listener {
    msg_tx: Sender<Message>,
    msg_rx: Receiver<Message>,
    mtu_tx: Sender<usize>,
    mtu_rx: Receiver<usize>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl Listener {
    pub fn new() -> Self {
        let (msg_tx, msg_rx) = bounded(LISTENER_QUEUE_DEPTH);
        let (mtu_tx, mtu_rx) = bounded(LISTENER_QUEUE_DEPTH);
        let (close_tx, close_rx) = bounded(0);
        Self {
            msg_tx,
            msg_rx,
            mtu_tx,
            mtu_rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    /// Queue an inbound message. Returns `false` if the listener is closed
    /// or its queue is full.
    pub fn push_message(&self, msg: Message) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.msg_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("listener queue full, dropping message");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue an MTU report. Returns `false` if closed or full.
    pub fn push_mtu(&self, mtu: usize) -> bool {
        !self.is_closed() && self.mtu_tx.try_send(mtu).is_ok()
    }

    /// Queue of inbound messages.
    pub fn messages(&self) -> &Receiver<Message> {
        &self.msg_rx
    }

    /// Queue of MTU reports.
    pub fn mtu_updates(&self) -> &Receiver<usize> {
        &self.mtu_rx
    }

    /// Never yields a value; becomes ready (disconnected) once closed.
    pub fn closed(&self) -> &Receiver<()> {
        &self.close_rx
    }

    /// Close the listener, waking anything selecting on [`Listener::closed`].
    pub fn close(&self) {
        self.close_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("queued", &self.msg_rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Shared map from target key to listener. All access is serialized.
#[derive(Debug, Default)]
pub struct ListenerMap {
    listeners: Mutex<HashMap<TargetKey, Arc<Listener>>>,
}

impl ListenerMap {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are only inserted or removed whole, so a poisoned map is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<TargetKey, Arc<Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. Fails if the key is taken.
    pub fn add(&self, key: TargetKey, listener: Arc<Listener>) -> Result<()> {
        let mut listeners = self.lock();
        if listeners.contains_key(&key) {
            return Err(SessionError::DuplicateListener(key.to_string()));
        }
        debug!(%key, "listener added");
        listeners.insert(key, listener);
        Ok(())
    }

    /// Remove whatever is registered under `key`.
    pub fn remove(&self, key: &TargetKey) -> Option<Arc<Listener>> {
        let removed = self.lock().remove(key);
        if removed.is_some() {
            debug!(%key, "listener removed");
        }
        removed
    }

    /// Remove a specific listener, wherever it is registered.
    pub fn remove_listener(&self, listener: &Arc<Listener>) -> Option<TargetKey> {
        let mut listeners = self.lock();
        let key = listeners
            .iter()
            .find(|(_, l)| Arc::ptr_eq(l, listener))
            .map(|(k, _)| k.clone())?;
        listeners.remove(&key);
        debug!(%key, "listener removed");
        Some(key)
    }

    pub fn find(&self, key: &TargetKey) -> Option<Arc<Listener>> {
        self.lock().get(key).cloned()
    }

    /// Route an inbound message. Returns `false` if nobody took it.
    pub fn dispatch_message(&self, key: &TargetKey, msg: Message) -> bool {
        match self.find(key) {
            Some(listener) => listener.push_message(msg),
            None => {
                debug!(%key, "no listener for inbound message");
                false
            }
        }
    }

    /// Route an MTU report. Returns `false` if nobody took it.
    pub fn dispatch_mtu(&self, key: &TargetKey, mtu: usize) -> bool {
        self.find(key).is_some_and(|listener| listener.push_mtu(mtu))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
