//! Pending request table
//!
//! One entry per command awaiting a reply. The table is the only state the
//! caller side and the inbound listener share, so every mutation happens
//! under its single lock and every hand-off to a waiter is a non-blocking
//! channel send.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use sepay_core::{Command, Frame};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Where a request is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Extended mode: waiting for ACK/NACK
    AwaitingAck,

    /// Waiting for the frame carrying the same command
    AwaitingResponse,
}

/// Delivered by the listener to a waiting `send`
#[derive(Debug)]
pub(crate) enum Signal {
    Ack,
    Nack,
    Response(Frame),
    Failed(sepay_core::Error),
}

/// Outcome of routing an inbound frame
#[derive(Debug)]
pub(crate) enum Dispatch {
    Delivered,
    Unsolicited(Frame),
}

#[derive(Debug)]
struct PendingRequest {
    token: u64,
    stage: Stage,
    /// Write sequence of the frame awaiting ACK/NACK, if one is on the wire
    written: Option<u64>,
    created_at: Instant,
    tx: mpsc::UnboundedSender<Signal>,
}

#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    open: bool,
    next_token: u64,
    next_write: u64,
    entries: HashMap<Command, PendingRequest>,
}

pub(crate) type SharedTable = Arc<Mutex<PendingTable>>;

impl PendingTable {
    /// Start accepting registrations
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Register a waiter for `command`
    pub fn register(
        &mut self,
        command: Command,
        stage: Stage,
    ) -> Result<(u64, mpsc::UnboundedReceiver<Signal>)> {
        if !self.open {
            return Err(Error::NotConnected);
        }

        let token = self.next_token;
        let (tx, rx) = mpsc::unbounded_channel();

        match self.entries.entry(command) {
            Entry::Occupied(_) => return Err(Error::DuplicateInFlightCommand(command)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    token,
                    stage,
                    written: None,
                    created_at: Instant::now(),
                    tx,
                });
            }
        }

        self.next_token += 1;
        debug!(%command, token, ?stage, "Registered pending request");

        Ok((token, rx))
    }

    /// Remove the entry for `command` if it still belongs to `token`
    pub fn remove(&mut self, command: Command, token: u64) -> bool {
        match self.entries.get(&command) {
            Some(pending) if pending.token == token => {
                self.entries.remove(&command);
                true
            }
            _ => false,
        }
    }

    /// Record that the frame for `command` went out
    ///
    /// Must be called in write order; ACK/NACK frames are matched against
    /// this sequence. No-op unless the request awaits an ACK.
    pub fn mark_written(&mut self, command: Command, token: u64) {
        if let Some(pending) = self.entries.get_mut(&command) {
            if pending.token == token && pending.stage == Stage::AwaitingAck {
                pending.written = Some(self.next_write);
                self.next_write += 1;
            }
        }
    }

    /// Route a decoded inbound frame to its waiter
    pub fn dispatch(&mut self, frame: Frame) -> Dispatch {
        if frame.command.is_control() {
            return self.dispatch_handshake(frame);
        }

        if let Entry::Occupied(slot) = self.entries.entry(frame.command) {
            if slot.get().stage == Stage::AwaitingResponse {
                let pending = slot.remove();
                debug!(
                    command = %frame.command,
                    elapsed = ?pending.created_at.elapsed(),
                    "Resolved pending request"
                );
                let _ = pending.tx.send(Signal::Response(frame));
                return Dispatch::Delivered;
            }
        }

        Dispatch::Unsolicited(frame)
    }

    /// ACK/NACK carry no command of their own; they answer the earliest
    /// written frame still waiting for one. A NACKed request leaves the
    /// queue until its resend is written.
    fn dispatch_handshake(&mut self, frame: Frame) -> Dispatch {
        let oldest = self
            .entries
            .iter_mut()
            .filter(|(_, pending)| pending.stage == Stage::AwaitingAck)
            .filter_map(|(command, pending)| Some((pending.written?, command, pending)))
            .min_by_key(|(written, _, _)| *written)
            .map(|(_, command, pending)| (command, pending));

        let Some((command, pending)) = oldest else {
            return Dispatch::Unsolicited(frame);
        };

        pending.written = None;
        let signal = if frame.is_ack() {
            pending.stage = Stage::AwaitingResponse;
            Signal::Ack
        } else {
            Signal::Nack
        };

        debug!(%command, ?signal, "Handshake frame received");
        let _ = pending.tx.send(signal);

        Dispatch::Delivered
    }

    /// Fail the request for `command` with a decode error attributed to it
    pub fn fail(&mut self, command: Command, error: sepay_core::Error) -> bool {
        if let Entry::Occupied(slot) = self.entries.entry(command) {
            if slot.get().stage == Stage::AwaitingResponse {
                let _ = slot.remove().tx.send(Signal::Failed(error));
                return true;
            }
        }
        false
    }

    /// Stop accepting registrations and reject every waiter
    ///
    /// Dropping the senders is the rejection: each waiter sees its channel
    /// close. Returns the number of rejected requests.
    pub fn close(&mut self) -> usize {
        self.open = false;
        let rejected = self.entries.len();
        self.entries.clear();
        rejected
    }
}

/// Releases a command slot when the owning `send` finishes or is dropped
pub(crate) struct PendingGuard {
    table: SharedTable,
    command: Command,
    token: u64,
}

impl PendingGuard {
    pub fn register(
        table: &SharedTable,
        command: Command,
        stage: Stage,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Signal>)> {
        let (token, rx) = table.lock().register(command, stage)?;
        let guard = Self {
            table: Arc::clone(table),
            command,
            token,
        };
        Ok((guard, rx))
    }

    /// Mark the request's frame as written; call with the writer held
    pub fn mark_written(&self) {
        self.table.lock().mark_written(self.command, self.token);
    }

    /// Remove the entry; `false` if something else already did
    pub fn release(&self) -> bool {
        self.table.lock().remove(self.command, self.token)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open_table() -> PendingTable {
        let mut table = PendingTable::default();
        table.open();
        table
    }

    #[test]
    fn test_register_requires_open_table() {
        let mut table = PendingTable::default();
        let result = table.register(Command::ENQUIRY, Stage::AwaitingResponse);
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let mut table = open_table();
        let _first = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();

        let second = table.register(Command::ENQUIRY, Stage::AwaitingResponse);
        assert!(matches!(
            second,
            Err(Error::DuplicateInFlightCommand(Command::ENQUIRY))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_response_resolves_waiter() {
        let mut table = open_table();
        let (_, mut rx) = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();

        let outcome = table.dispatch(Frame::with_payload(Command::ENQUIRY, "0"));
        assert!(matches!(outcome, Dispatch::Delivered));
        assert_eq!(table.len(), 0);

        match rx.try_recv().unwrap() {
            Signal::Response(frame) => assert_eq!(frame.payload.as_ref(), b"0"),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_frame_is_unsolicited() {
        let mut table = open_table();
        let outcome = table.dispatch(Frame::new(Command::ENQUIRY));
        assert!(matches!(outcome, Dispatch::Unsolicited(_)));
    }

    #[test]
    fn test_response_before_ack_is_unsolicited() {
        let mut table = open_table();
        let (_, _rx) = table.register(Command::START_TRANSACTION, Stage::AwaitingAck).unwrap();

        let outcome = table.dispatch(Frame::new(Command::START_TRANSACTION));
        assert!(matches!(outcome, Dispatch::Unsolicited(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ack_goes_to_earliest_written() {
        let mut table = open_table();
        let (a, mut first) = table.register(Command::START_TRANSACTION, Stage::AwaitingAck).unwrap();
        let (b, mut second) = table.register(Command::from(0x42), Stage::AwaitingAck).unwrap();
        table.mark_written(Command::START_TRANSACTION, a);
        table.mark_written(Command::from(0x42), b);

        table.dispatch(Frame::new(Command::ACK));

        assert!(matches!(first.try_recv(), Ok(Signal::Ack)));
        assert!(second.try_recv().is_err());

        // First is now awaiting its response, so the NACK belongs to second
        table.dispatch(Frame::new(Command::NACK));
        assert!(matches!(second.try_recv(), Ok(Signal::Nack)));
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn test_ack_ignores_unwritten_request() {
        let mut table = open_table();
        let (_, mut rx) = table.register(Command::START_TRANSACTION, Stage::AwaitingAck).unwrap();

        let outcome = table.dispatch(Frame::new(Command::ACK));
        assert!(matches!(outcome, Dispatch::Unsolicited(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resend_queues_behind_later_writes() {
        let mut table = open_table();
        let (a, mut first) = table.register(Command::START_TRANSACTION, Stage::AwaitingAck).unwrap();
        let (b, mut second) = table.register(Command::from(0x42), Stage::AwaitingAck).unwrap();

        table.mark_written(Command::START_TRANSACTION, a);
        table.dispatch(Frame::new(Command::NACK));
        assert!(matches!(first.try_recv(), Ok(Signal::Nack)));

        // Second goes out during the backoff, then first is resent
        table.mark_written(Command::from(0x42), b);
        table.mark_written(Command::START_TRANSACTION, a);

        table.dispatch(Frame::new(Command::ACK));
        assert!(matches!(second.try_recv(), Ok(Signal::Ack)));
        assert!(first.try_recv().is_err());

        table.dispatch(Frame::new(Command::ACK));
        assert!(matches!(first.try_recv(), Ok(Signal::Ack)));
    }

    #[test]
    fn test_mark_written_skips_simple_request() {
        let mut table = open_table();
        let (token, _rx) = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();
        table.mark_written(Command::ENQUIRY, token);

        let outcome = table.dispatch(Frame::new(Command::ACK));
        assert!(matches!(outcome, Dispatch::Unsolicited(_)));
    }

    #[test]
    fn test_stale_token_does_not_remove_new_entry() {
        let mut table = open_table();
        let (old, _) = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();
        assert!(table.remove(Command::ENQUIRY, old));

        let (_, _rx) = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();
        assert!(!table.remove(Command::ENQUIRY, old));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_fail_attributed_request() {
        let mut table = open_table();
        let (_, mut rx) = table.register(Command::TRANSACTION_STATUS, Stage::AwaitingResponse).unwrap();

        let error = sepay_core::Error::ChecksumMismatch { expected: 1, received: 2 };
        assert!(table.fail(Command::TRANSACTION_STATUS, error.clone()));
        assert!(matches!(rx.try_recv(), Ok(Signal::Failed(e)) if e == error));
        assert!(!table.fail(Command::TRANSACTION_STATUS, error));
    }

    #[test]
    fn test_close_rejects_everything() {
        let mut table = open_table();
        let (_, mut a) = table.register(Command::ENQUIRY, Stage::AwaitingResponse).unwrap();
        let (_, mut b) = table.register(Command::START_TRANSACTION, Stage::AwaitingAck).unwrap();

        assert_eq!(table.close(), 2);
        assert_eq!(table.len(), 0);
        assert!(matches!(a.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        assert!(matches!(b.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));

        assert!(matches!(
            table.register(Command::ENQUIRY, Stage::AwaitingResponse),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let table: SharedTable = Arc::new(Mutex::new(open_table()));

        let (guard, _rx) = PendingGuard::register(&table, Command::ENQUIRY, Stage::AwaitingResponse).unwrap();
        assert_eq!(table.lock().len(), 1);

        drop(guard);
        assert_eq!(table.lock().len(), 0);
    }
}
