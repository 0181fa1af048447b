use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select_biased, Receiver, Sender};
use nodelink_coap::{Code, Message};
use nodelink_transport::TransportError;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::listener::{Listener, TargetKey};
use crate::transceiver::Transceiver;

struct OpenState {
    txvr: Arc<Transceiver>,
    listener: Arc<Listener>,
    stop: Sender<()>,
    worker: JoinHandle<()>,
}

/// A logical connection to one target over a shared [`Link`].
///
/// `open` registers a listener for the target and starts a loop that feeds
/// inbound messages to the transceiver and tracks MTU reports. At most one
/// request is in flight; `close` fails it and joins the loop.
pub struct Session<L: Link> {
    link: Arc<L>,
    config: SessionConfig,
    target: L::Target,
    key: TargetKey,
    mtu: Arc<AtomicUsize>,
    message_ids: AtomicU16,
    state: Mutex<Option<OpenState>>,
}

impl<L: Link> Session<L> {
    /// Create a closed session. Fails with `InvalidAddress` if the link
    /// cannot resolve `config.addr`.
    pub fn new(link: Arc<L>, config: SessionConfig) -> Result<Self> {
        let target = link.resolve(&config.addr)?;
        let key = link.target_key(&target);
        Ok(Self {
            link,
            config,
            target,
            key,
            mtu: Arc::new(AtomicUsize::new(0)),
            message_ids: AtomicU16::new(1),
            state: Mutex::new(None),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, Option<OpenState>>> {
        self.state.lock().map_err(|_| SessionError::Poisoned)
    }

    pub fn open(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.is_some() {
            return Err(SessionError::AlreadyOpen);
        }

        let txvr = Arc::new(Transceiver::new());
        let listener = Arc::new(Listener::new());
        self.link
            .listeners()
            .add(self.key.clone(), Arc::clone(&listener))?;

        let (stop, stop_rx) = bounded(0);
        let spawned = {
            let link = Arc::clone(&self.link);
            let listener = Arc::clone(&listener);
            let txvr = Arc::clone(&txvr);
            let mtu = Arc::clone(&self.mtu);
            let target = self.target.to_string();
            thread::Builder::new()
                .name(format!("nodelink-session-{target}"))
                .spawn(move || run_session_loop(link, listener, txvr, mtu, stop_rx, target))
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.link.listeners().remove_listener(&listener);
                return Err(TransportError::Io(err).into());
            }
        };

        *state = Some(OpenState {
            txvr,
            listener,
            stop,
            worker,
        });
        info!(target = %self.target, "session opened");
        Ok(())
    }

    /// Fail any in-flight request, stop the loop and wait for it to exit.
    ///
    /// The state lock is held until the listener is out of the map and the
    /// loop has joined, so a racing `open` sees either `AlreadyOpen` or a
    /// fully closed session.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state()?;
        let open = state.take().ok_or(SessionError::NotOpen)?;

        open.txvr.stop();
        open.txvr.error_all(SessionError::SessionClosed);
        drop(open.stop);
        open.listener.close();
        self.link.listeners().remove_listener(&open.listener);
        let joined = open.worker.join();
        drop(state);
        joined.map_err(|_| SessionError::Poisoned)?;

        info!(target = %self.target, "session closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state().map(|s| s.is_some()).unwrap_or(false)
    }

    fn transceiver(&self) -> Result<Arc<Transceiver>> {
        self.state()?
            .as_ref()
            .map(|open| Arc::clone(&open.txvr))
            .ok_or(SessionError::SessionClosed)
    }

    /// Send `msg` and block until its response, `timeout`, or close.
    ///
    /// A token is assigned if the message has none.
    pub fn transmit_once(&self, mut msg: Message, timeout: Duration) -> Result<Message> {
        let txvr = self.transceiver()?;
        if msg.token().is_empty() {
            msg.set_token(txvr.next_token())?;
        }

        let encoded = self.link.codec().encode(&msg)?;
        let segment_size = self.mtu();
        trace!(
            target = %self.target,
            code = %msg.code(),
            id = msg.message_id(),
            len = encoded.len(),
            "transmitting"
        );

        txvr.transmit(
            msg.token().clone(),
            || self.link.send(&self.target, &encoded, segment_size),
            timeout,
        )
    }

    /// [`Session::transmit_once`] with the configured timeout, retried on
    /// timeout up to the configured retry budget.
    pub fn transmit(&self, msg: Message) -> Result<Message> {
        let mut attempt = 0;
        loop {
            match self.transmit_once(msg.clone(), self.config.timeout) {
                Err(SessionError::Timeout(timeout)) if attempt < self.config.retries => {
                    attempt += 1;
                    debug!(target = %self.target, attempt, ?timeout, "retrying after timeout");
                }
                result => return result,
            }
        }
    }

    /// Fail the in-flight request, if any, with `Aborted`.
    pub fn abort_rx(&self) -> Result<()> {
        self.transceiver()?.error_all(SessionError::Aborted);
        Ok(())
    }

    /// Confirmable request for `path` with a fresh message id.
    pub fn request(&self, code: Code, path: &str) -> Message {
        let id = self.message_ids.fetch_add(1, Ordering::Relaxed);
        let mut msg = Message::request(code, id);
        msg.set_path_string(path);
        msg
    }

    /// Segment budget: configured override, else the last MTU the link
    /// reported, else the link's floor.
    pub fn mtu(&self) -> usize {
        if let Some(size) = self.config.segment_size.filter(|s| *s > 0) {
            return size;
        }
        match self.mtu.load(Ordering::Acquire) {
            0 => self.link.min_mtu(),
            reported => reported,
        }
    }

    pub fn mtu_in(&self) -> usize {
        self.link.mtu_in()
    }

    pub fn mtu_out(&self) -> usize {
        self.link.mtu_out(self.mtu.load(Ordering::Acquire))
    }

    pub fn target(&self) -> &L::Target {
        &self.target
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn link(&self) -> &Arc<L> {
        &self.link
    }
}

impl<L: Link> Drop for Session<L> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                debug!(error = %err, "close on drop failed");
            }
        }
    }
}

fn run_session_loop<L: Link>(
    link: Arc<L>,
    listener: Arc<Listener>,
    txvr: Arc<Transceiver>,
    mtu: Arc<AtomicUsize>,
    stop: Receiver<()>,
    target: String,
) {
    loop {
        select_biased! {
            recv(stop) -> _ => break,
            recv(listener.closed()) -> _ => break,
            recv(listener.messages()) -> msg => match msg {
                Ok(msg) => {
                    txvr.dispatch(msg);
                }
                Err(_) => break,
            },
            recv(listener.mtu_updates()) -> update => {
                if let Ok(update) = update {
                    if mtu.swap(update, Ordering::AcqRel) != update {
                        debug!(%target, mtu = update, "setting mtu");
                    }
                }
            },
        }
    }
    link.listeners().remove_listener(&listener);
    debug!(%target, "session loop exited");
}
