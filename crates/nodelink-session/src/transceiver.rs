use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use nodelink_coap::Message;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

struct Pending {
    token: Bytes,
    reply: Sender<Result<Message>>,
}

/// Matches responses to the single outstanding request of a session.
///
/// Responses are matched by token. Anything else that arrives is dropped.
pub struct Transceiver {
    pending: Mutex<Option<Pending>>,
    in_flight: Mutex<()>,
    stopped: AtomicBool,
    next_token: AtomicU32,
}

impl Transceiver {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(1);
        Self {
            pending: Mutex::new(None),
            in_flight: Mutex::new(()),
            stopped: AtomicBool::new(false),
            next_token: AtomicU32::new(seed),
        }
    }

    // The pending slot is only swapped whole, so poisoning cannot leave it
    // half-updated.
    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh 4-byte token.
    pub fn next_token(&self) -> Bytes {
        let value = self.next_token.fetch_add(1, Ordering::Relaxed);
        Bytes::copy_from_slice(&value.to_be_bytes())
    }

    /// Register `token` as pending, run `send`, then block until the
    /// matching response, `timeout`, or a forced failure.
    ///
    /// Concurrent callers queue up; at most one request is in flight.
    pub fn transmit<F>(&self, token: Bytes, send: F, timeout: Duration) -> Result<Message>
    where
        F: FnOnce() -> Result<()>,
    {
        let _in_flight = self.in_flight.lock().map_err(|_| SessionError::Poisoned)?;

        let (reply, response) = bounded(1);
        {
            // stop + error_all never miss a request registered here
            let mut slot = self.slot();
            if self.is_stopped() {
                return Err(SessionError::SessionClosed);
            }
            *slot = Some(Pending {
                token: token.clone(),
                reply,
            });
        }

        if let Err(err) = send() {
            self.slot().take();
            return Err(err);
        }
        trace!(token = ?token, "request sent, waiting for response");

        match response.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.slot().take();
                debug!(token = ?token, ?timeout, "request timed out");
                Err(SessionError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::SessionClosed),
        }
    }

    /// Hand an inbound message to the pending request if the token matches.
    /// Returns `true` if it completed a request.
    pub fn dispatch(&self, msg: Message) -> bool {
        let mut slot = self.slot();
        if !slot.as_ref().is_some_and(|p| p.token == *msg.token()) {
            debug!(
                token = ?msg.token(),
                code = %msg.code(),
                "dropping unsolicited message"
            );
            return false;
        }
        if let Some(pending) = slot.take() {
            let _ = pending.reply.send(Ok(msg));
        }
        true
    }

    /// Fail the pending request, if any, with `err`.
    pub fn error_all(&self, err: SessionError) {
        if let Some(pending) = self.slot().take() {
            debug!(error = %err, "failing pending request");
            let _ = pending.reply.send(Err(err));
        }
    }

    /// Refuse further requests. On shutdown call this before
    /// [`Transceiver::error_all`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        self.slot().is_some()
    }
}

impl Default for Transceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use nodelink_coap::{Code, MessageType};

    use super::*;

    fn response(token: &[u8]) -> Message {
        let mut msg = Message::new(MessageType::Acknowledgement, Code::CONTENT, 1);
        msg.set_token(Bytes::copy_from_slice(token)).unwrap();
        msg
    }

    fn wait_for_pending(txvr: &Transceiver) {
        while !txvr.has_pending() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn matching_response_completes_request() {
        let txvr = Arc::new(Transceiver::new());
        let responder = Arc::clone(&txvr);
        let handle = thread::spawn(move || {
            wait_for_pending(&responder);
            assert!(!responder.dispatch(response(b"other")));
            assert!(responder.dispatch(response(b"tok")));
        });

        let rsp = txvr
            .transmit(Bytes::from_static(b"tok"), || Ok(()), Duration::from_secs(5))
            .expect("response should arrive");
        assert_eq!(rsp.token().as_ref(), b"tok");
        handle.join().expect("responder should finish");
        assert!(!txvr.has_pending());
    }

    #[test]
    fn times_out_without_response() {
        let txvr = Transceiver::new();
        let err = txvr
            .transmit(Bytes::from_static(b"t"), || Ok(()), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert!(!txvr.has_pending());
    }

    #[test]
    fn send_error_clears_pending() {
        let txvr = Transceiver::new();
        let err = txvr
            .transmit(
                Bytes::new(),
                || Err(SessionError::InvalidAddress("x".into())),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidAddress(_)));
        assert!(!txvr.has_pending());
    }

    #[test]
    fn error_all_fails_in_flight_request() {
        let txvr = Arc::new(Transceiver::new());
        let killer = Arc::clone(&txvr);
        let handle = thread::spawn(move || {
            wait_for_pending(&killer);
            killer.error_all(SessionError::Aborted);
        });

        let err = txvr
            .transmit(Bytes::new(), || Ok(()), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, SessionError::Aborted));
        handle.join().expect("killer should finish");
    }

    #[test]
    fn stopped_transceiver_refuses_requests() {
        let txvr = Transceiver::new();
        txvr.stop();
        let err = txvr
            .transmit(Bytes::new(), || panic!("must not send"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));
    }

    #[test]
    fn unsolicited_message_is_dropped() {
        let txvr = Transceiver::new();
        assert!(!txvr.dispatch(response(b"x")));
    }

    #[test]
    fn tokens_are_distinct() {
        let txvr = Transceiver::new();
        let a = txvr.next_token();
        let b = txvr.next_token();
        assert_eq!(a.len(), 4);
        assert_ne!(a, b);
    }
}
