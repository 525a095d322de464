//! High-level terminal interface
//!
//! A [`Terminal`] owns one connection. Two activities drive it: callers
//! issuing [`Terminal::send`], and a listener task that reassembles inbound
//! bytes into frames and hands each one to the request waiting for it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace, warn};

use sepay_core::{Command, Frame, FrameDecoder, Rejected, Session};
use sepay_transport::{BoxStream, TcpTransport, Transport};
use sepay_types::{Fields, TransactionRequest};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::SessionEvent;
use crate::pending::{Dispatch, PendingGuard, PendingTable, SharedTable, Signal, Stage};

const EVENT_CAPACITY: usize = 64;
const READ_CHUNK: usize = 4 * 1024;

type ConnectionSlot = Arc<Mutex<Option<Arc<Connection>>>>;

/// Sepay payment terminal
///
/// Cheap to clone; clones share the same connection, so several tasks can
/// have requests in flight at once (one per command).
///
/// # Examples
///
/// ```no_run
/// use sepay::{Command, Terminal};
///
/// #[tokio::main]
/// async fn main() -> sepay::Result<()> {
///     let terminal = Terminal::new("192.168.0.105", 1234);
///
///     terminal.connect().await?;
///
///     let response = terminal.send(Command::ENQUIRY, "").await?;
///     println!("Status: {}", response);
///
///     terminal.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Terminal {
    inner: Arc<Inner>,
}

struct Inner {
    transport: AsyncMutex<Box<dyn Transport>>,
    session: Session,
    config: Config,
    pending: SharedTable,
    connection: ConnectionSlot,
    next_connection: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

/// Resources of one open connection
///
/// Installed and removed together with the session state, under the pending
/// table lock, so a close never touches the resources of a later connect.
struct Connection {
    id: u64,
    writer: AsyncMutex<WriteHalf<BoxStream>>,
    listener: JoinHandle<()>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Abort the listener and interrupt in-flight writes
    fn cancel(&self) {
        self.closed.send_replace(true);
        self.listener.abort();
    }

    /// Resolves once the connection has been cancelled
    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        while !*closed.borrow_and_update() {
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Write one encoded frame
    ///
    /// The writer lock orders frames on the wire, so the request is marked
    /// written while the lock is held.
    async fn write(&self, wire: &[u8], guard: &PendingGuard) -> Result<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            guard.mark_written();

            trace!("Sending {} bytes: {}", wire.len(), hex::encode(wire));

            writer
                .write_all(wire)
                .await
                .map_err(Error::TransportWriteError)?;
            writer.flush().await.map_err(Error::TransportWriteError)
        };

        tokio::select! {
            biased;
            _ = self.closed() => Err(Error::SessionClosed),
            result = write => result,
        }
    }
}

impl Terminal {
    /// Create a new terminal instance (TCP transport, default config)
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self::with_transport(TcpTransport::new(ip, port), Config::default())
    }

    /// Create a terminal over any transport
    pub fn with_transport(transport: impl Transport + 'static, config: Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                transport: AsyncMutex::new(Box::new(transport)),
                session: Session::new(),
                config,
                pending: Arc::new(Mutex::new(PendingTable::default())),
                connection: Arc::new(Mutex::new(None)),
                next_connection: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Check if extended mode has been negotiated
    pub fn is_extended(&self) -> bool {
        self.inner.session.is_extended()
    }

    /// Number of requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Subscribe to unsolicited frames, decode errors and disconnects
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Connect to terminal
    ///
    /// When [`Config::negotiate_extended_mode`] is set, extended mode is
    /// requested right after the transport opens. If the terminal refuses,
    /// this returns [`Error::ExtendedModeRejected`] and the session stays
    /// connected in basic mode; call [`Terminal::close`] to abort instead.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Already connected
    /// - Transport fails to open
    /// - Extended mode negotiation fails
    pub async fn connect(&self) -> Result<()> {
        let mut transport = self.inner.transport.lock().await;

        if self.inner.session.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let remote = transport.remote_addr();
        info!("Connecting to {}...", remote);

        let stream = transport.connect().await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let listener = Listener {
            id,
            pending: Arc::clone(&self.inner.pending),
            session: self.inner.session.clone(),
            connection: Arc::clone(&self.inner.connection),
            events: self.inner.events.clone(),
            decoder: FrameDecoder::with_max_frame_size(self.inner.config.max_frame_size),
        };

        {
            let mut pending = self.inner.pending.lock();
            let mut slot = self.inner.connection.lock();

            self.inner.session.initialize()?;
            pending.open();

            let (closed, _) = watch::channel(false);
            let connection = Connection {
                id,
                writer: AsyncMutex::new(write_half),
                listener: tokio::spawn(listener.run(read_half)),
                closed,
            };
            if let Some(stale) = slot.replace(Arc::new(connection)) {
                stale.cancel();
            }
        }

        drop(transport);
        info!("Connected to {}", remote);

        if self.inner.config.negotiate_extended_mode {
            if let Err(e) = self.enable_extended_mode().await {
                warn!("Extended mode negotiation failed: {}", e);
                return Err(Error::ExtendedModeRejected(e.to_string()));
            }
        }

        Ok(())
    }

    /// Close the session
    ///
    /// Every request still pending fails with [`Error::SessionClosed`],
    /// including one blocked writing to a peer that stopped reading.
    /// Calling this on a closed session does nothing.
    pub async fn close(&self) -> Result<()> {
        // Stop accepting sends, reject waiters and detach the connection
        // in one critical section
        let (rejected, connection) = {
            let mut pending = self.inner.pending.lock();
            let mut slot = self.inner.connection.lock();

            let rejected = pending.close();
            self.inner.session.close();
            (rejected, slot.take())
        };

        let Some(connection) = connection else {
            return Ok(());
        };
        connection.cancel();

        let shutdown = async { connection.writer.lock().await.shutdown().await };
        match tokio::time::timeout(self.inner.config.timeout, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Shutdown after close failed: {}", e),
            Err(_) => debug!("Shutdown after close timed out"),
        }

        info!(rejected, "Session closed");
        Ok(())
    }

    /// Send a command and wait for the frame answering it
    ///
    /// In extended mode a command outside [`Config::simple_commands`] must be
    /// ACKed first; a NACK triggers up to [`Config::nack_retries`] resends.
    /// The timeout covers the whole exchange, writes and backoff included.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if there is no open session
    /// - [`Error::Core`] if the frame cannot be encoded, or the reply failed
    ///   its checks
    /// - [`Error::DuplicateInFlightCommand`] if the same command is already
    ///   awaiting a reply
    /// - [`Error::TransportWriteError`] if the frame could not be written
    /// - [`Error::ResponseTimeout`] if no reply arrives before the deadline
    /// - [`Error::NegativeAcknowledged`] if resends are exhausted
    /// - [`Error::SessionClosed`] if the session closes while waiting
    pub async fn send(&self, command: Command, payload: impl Into<Bytes>) -> Result<Frame> {
        let connection = self.inner.connection.lock().clone().ok_or(Error::NotConnected)?;

        let frame = Frame::with_payload(command, payload);
        let wire = frame.encode()?.freeze();

        let handshake = self.inner.session.is_extended() && !self.inner.config.is_simple(command);
        let stage = if handshake {
            Stage::AwaitingAck
        } else {
            Stage::AwaitingResponse
        };

        let (guard, mut signals) = PendingGuard::register(&self.inner.pending, command, stage)?;
        let deadline = Instant::now() + self.inner.config.timeout;

        debug!(%command, handshake, payload_len = frame.payload.len(), "Sending command");
        self.write_frame(&connection, &wire, &guard, command, deadline)
            .await?;

        let mut attempts = 1;
        loop {
            let signal = match timeout_at(deadline, signals.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    if guard.release() {
                        return Err(self.expired(command));
                    }
                    // Resolved while the deadline fired
                    settled(&mut signals)
                }
            };

            match signal {
                Some(Signal::Ack) => {
                    debug!(%command, "ACK received, awaiting response");
                }
                Some(Signal::Nack) => {
                    if attempts > self.inner.config.nack_retries {
                        guard.release();
                        warn!(%command, attempts, "NACK retries exhausted");
                        return Err(Error::NegativeAcknowledged { command, attempts });
                    }

                    warn!(%command, attempt = attempts, "NACK received, resending");

                    // Nothing is routed to an unwritten request, so the
                    // channel only yields again once the session closes
                    tokio::select! {
                        biased;
                        None = signals.recv() => return Err(Error::SessionClosed),
                        _ = tokio::time::sleep_until(deadline) => return Err(self.expired(command)),
                        _ = tokio::time::sleep(self.inner.config.retry_backoff) => {}
                    }

                    self.write_frame(&connection, &wire, &guard, command, deadline)
                        .await?;
                    attempts += 1;
                }
                Some(Signal::Response(response)) => {
                    trace!("Received: {:?}", response);
                    return Ok(response);
                }
                Some(Signal::Failed(error)) => return Err(error.into()),
                None => return Err(Error::SessionClosed),
            }
        }
    }

    /// Switch the terminal to extended mode
    pub async fn enable_extended_mode(&self) -> Result<()> {
        debug!("Enabling extended mode...");

        let response = self.send(Command::ENABLE_EXTENDED_MODE, Bytes::new()).await?;
        trace!("Extended mode reply: {:?}", response);

        self.inner.session.enable_extended()?;
        info!("Extended mode enabled");

        Ok(())
    }

    /// Check terminal status (ENQ)
    pub async fn enquiry(&self) -> Result<Fields> {
        let response = self.send(Command::ENQUIRY, Bytes::new()).await?;
        Ok(Fields::parse(&response.payload)?)
    }

    /// Start a payment transaction
    pub async fn start_transaction(&self, request: &TransactionRequest) -> Result<Fields> {
        let payload = request.to_payload()?;

        info!(
            amount = request.amount_minor,
            reference = %request.reference,
            "Starting transaction"
        );

        let response = self.send(Command::START_TRANSACTION, payload).await?;
        Ok(Fields::parse(&response.payload)?)
    }

    /// Query the status of a transaction by reference
    pub async fn transaction_status(&self, reference: &str) -> Result<Fields> {
        let response = self
            .send(Command::TRANSACTION_STATUS, reference.to_owned())
            .await?;
        Ok(Fields::parse(&response.payload)?)
    }

    // Helper methods

    async fn write_frame(
        &self,
        connection: &Connection,
        wire: &[u8],
        guard: &PendingGuard,
        command: Command,
        deadline: Instant,
    ) -> Result<()> {
        match timeout_at(deadline, connection.write(wire, guard)).await {
            Ok(result) => result,
            Err(_) => Err(self.expired(command)),
        }
    }

    fn expired(&self, command: Command) -> Error {
        let timeout = self.inner.config.timeout;
        warn!(%command, ?timeout, "Response timeout");
        Error::ResponseTimeout { command, timeout }
    }
}

/// Final signal already queued for a request whose entry is gone
fn settled(signals: &mut mpsc::UnboundedReceiver<Signal>) -> Option<Signal> {
    while let Ok(signal) = signals.try_recv() {
        if matches!(signal, Signal::Response(_) | Signal::Failed(_)) {
            return Some(signal);
        }
    }
    None
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.lock().take() {
            warn!("Terminal dropped while still connected");
            connection.cancel();
        }
    }
}

/// Inbound side of a connection
struct Listener {
    id: u64,
    pending: SharedTable,
    session: Session,
    connection: ConnectionSlot,
    events: broadcast::Sender<SessionEvent>,
    decoder: FrameDecoder,
}

impl Listener {
    async fn run(mut self, mut reader: ReadHalf<BoxStream>) {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);

        loop {
            buf.clear();

            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    info!("Terminal closed the connection");
                    break;
                }
                Ok(n) => {
                    trace!("Received {} bytes: {}", n, hex::encode(&buf[..n]));

                    self.decoder.push(&buf[..n]);
                    while let Some(item) = self.decoder.next_frame() {
                        self.dispatch(item);
                    }
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    break;
                }
            }
        }

        self.teardown();
    }

    fn dispatch(&self, item: std::result::Result<Frame, Rejected>) {
        match item {
            Ok(frame) => {
                trace!("Received: {:?}", frame);

                let outcome = self.pending.lock().dispatch(frame);
                if let Dispatch::Unsolicited(frame) = outcome {
                    warn!(command = %frame.command, "Unsolicited frame");
                    let _ = self.events.send(SessionEvent::Unsolicited(frame));
                }
            }
            Err(Rejected {
                error,
                command,
                raw,
            }) => {
                warn!(
                    error = %error,
                    raw = %hex::encode(&raw),
                    "Failed to decode inbound bytes"
                );

                if let Some(command) = command {
                    if self.pending.lock().fail(command, error.clone()) {
                        debug!(%command, "Decode error attributed to pending request");
                    }
                }

                let _ = self.events.send(SessionEvent::DecodeError { error, raw });
            }
        }
    }

    fn teardown(&self) {
        let (rejected, connection) = {
            let mut pending = self.pending.lock();
            let mut slot = self.connection.lock();

            // Already detached by close
            let Some(connection) = slot.take_if(|connection| connection.id == self.id) else {
                return;
            };

            let rejected = pending.close();
            self.session.close();
            (rejected, connection)
        };

        connection.closed.send_replace(true);

        warn!(rejected, "Connection lost");
        let _ = self.events.send(SessionEvent::Disconnected);
    }
}
