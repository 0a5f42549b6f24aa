//! The connection facade and its reader/writer tasks.
//!
//! Each connection runs two Tokio tasks around the split transport:
//!
//! ```text
//!                      ┌────────────────────────────┐
//!   FramedRead ───────▶│        Reader task         │──▶ ListenerRegistry
//!                      │  (sole dispatcher, in      │     (plain listeners +
//!                      │   transport arrival order) │      request listeners)
//!                      └────────────────────────────┘
//!                      ┌────────────────────────────┐
//!   send()/request() ─▶│  bounded mpsc ─ Writer task│──▶ FramedWrite
//!                      │  (one entry = one batch)   │
//!                      └────────────────────────────┘
//! ```
//!
//! State transitions are committed under a lock and then broadcast, both to
//! registered [`ConnectionStateListener`]s and over a `watch` channel that
//! `close()` handles and pending requests observe for cancellation.

mod registry;
mod request;
mod state;

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn, Instrument};

use crate::error::{ConnectError, ProtocolError, RequestError, SendError};
use crate::filter::MessageFilter;
use crate::message::Message;
use crate::transport::{TlsOptions, TransportReader, TransportStream, TransportWriter};

pub use registry::{ConnectionStateListener, MessageListener};
pub use state::ConnectionState;

use registry::{ListenerRegistry, StateListenerRegistry};
use request::{DeregisterOnDrop, RequestListener};

/// Depth of the outbound batch queue shared by all senders.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Options for establishing a connection.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Peer address as `host:port`.
    pub address: String,
    /// TLS settings; `None` for plain TCP.
    pub tls: Option<TlsOptions>,
}

impl ConnectOptions {
    /// Plain-TCP options for `address` (`host:port`).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: None,
        }
    }

    /// Enable TLS with default settings (native roots, SNI from the host
    /// portion of the address).
    #[must_use]
    pub fn with_tls(mut self) -> Self {
        self.tls = Some(TlsOptions::default());
        self
    }

    /// Enable TLS with explicit settings.
    #[must_use]
    pub fn with_tls_options(mut self, options: TlsOptions) -> Self {
        self.tls = Some(options);
        self
    }
}

/// One contiguous batch of outbound messages plus its completion signal.
struct Outbound {
    messages: Vec<Message>,
    done: oneshot::Sender<Result<(), SendError>>,
}

struct Shared {
    listeners: ListenerRegistry,
    state_listeners: StateListenerRegistry,
    /// Authoritative state; transitions are serialized by this lock.
    state: Mutex<ConnectionState>,
    /// Broadcast of committed transitions, observed by `close()` handles and
    /// pending requests.
    state_tx: watch::Sender<ConnectionState>,
    outgoing: mpsc::Sender<Outbound>,
}

impl Shared {
    /// Commit a state transition and broadcast it. Returns `false` (and does
    /// nothing) when the transition is not legal from the current state.
    fn transition(&self, to: ConnectionState) -> bool {
        let old = {
            let mut state = self.state.lock();
            let old = *state;
            if !old.can_transition_to(to) {
                return false;
            }
            *state = to;
            old
        };

        debug!(%old, new = %to, "connection state changed");
        // send_replace updates the value even when no receiver exists yet.
        self.state_tx.send_replace(to);
        self.state_listeners.notify(old, to);
        true
    }
}

/// A connection to a remote IRC peer.
///
/// Cheap to clone; all clones refer to the same underlying connection. See
/// the [crate documentation](crate) for an overview and example.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Establish a connection and spawn its reader and writer tasks.
    pub async fn connect(options: ConnectOptions) -> Result<Connection, ConnectError> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let shared = Arc::new(Shared {
            listeners: ListenerRegistry::new(),
            state_listeners: StateListenerRegistry::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            state_tx,
            outgoing: outgoing_tx,
        });

        shared.transition(ConnectionState::Connecting);
        let transport = match TransportStream::connect(&options.address, options.tls.as_ref())
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                shared.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        info!(address = %options.address, tls = transport.is_tls(), "connected");

        let (reader, writer) = transport.split();
        shared.transition(ConnectionState::Connected);

        tokio::spawn(
            run_reader(Arc::clone(&shared), reader)
                .instrument(tracing::info_span!("reader", peer = %options.address)),
        );
        tokio::spawn(
            run_writer(Arc::clone(&shared), writer, outgoing_rx)
                .instrument(tracing::info_span!("writer", peer = %options.address)),
        );

        Ok(Connection { shared })
    }

    /// Register `listener` for messages accepted by `filter`.
    ///
    /// If this listener (same `Arc` allocation) is already registered, its
    /// filter is replaced; no duplicate entry is created.
    pub fn add_message_listener(&self, filter: MessageFilter, listener: Arc<dyn MessageListener>) {
        self.shared.listeners.add(filter, listener);
    }

    /// Remove a previously registered message listener. A no-op when the
    /// listener is not registered.
    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) {
        self.shared.listeners.remove(listener);
    }

    /// Register a connection-state observer.
    pub fn add_state_listener(&self, listener: Arc<dyn ConnectionStateListener>) {
        self.shared.state_listeners.add(listener);
    }

    /// Remove a connection-state observer. A no-op when absent.
    pub fn remove_state_listener(&self, listener: &Arc<dyn ConnectionStateListener>) {
        self.shared.state_listeners.remove(listener);
    }

    /// Send one message.
    ///
    /// Fails immediately with [`SendError::NotConnected`] unless the
    /// connection is `Connected`; otherwise resolves once the batch is
    /// queued, returning a [`SendHandle`] for the eventual write completion.
    pub async fn send(&self, message: Message) -> Result<SendHandle, SendError> {
        self.send_all(vec![message]).await
    }

    /// Send several messages as one contiguous, ordered unit.
    ///
    /// The batch is written to the transport without interleaving with any
    /// other `send` call's messages.
    pub async fn send_all(&self, messages: Vec<Message>) -> Result<SendHandle, SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.shared
            .outgoing
            .send(Outbound {
                messages,
                done: done_tx,
            })
            .await
            .map_err(|_| SendError::ConnectionClosed)?;

        Ok(SendHandle { rx: done_rx })
    }

    /// Send `messages` and collect the response.
    ///
    /// Every inbound message accepted by `match_filter` is accumulated until
    /// one accepted by `terminal_filter` arrives; the terminal message is
    /// included as the last element of the result. The ephemeral listener is
    /// registered *before* the messages are sent, so a reply cannot race the
    /// registration. Concurrent requests are independent: a message may be
    /// accumulated by several outstanding requests at once.
    ///
    /// The call fails with [`RequestError::Cancelled`] if the connection
    /// starts closing or disconnects while waiting. Dropping the returned
    /// future deregisters the ephemeral listener.
    pub async fn request(
        &self,
        match_filter: MessageFilter,
        terminal_filter: MessageFilter,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, RequestError> {
        if !self.is_connected() {
            return Err(RequestError::NotConnected);
        }

        let (listener, response) = RequestListener::new(match_filter, terminal_filter);
        let dyn_listener: Arc<dyn MessageListener> = listener.clone();
        self.shared
            .listeners
            .add(listener.subscription_filter(), Arc::clone(&dyn_listener));
        let _guard = DeregisterOnDrop {
            registry: &self.shared.listeners,
            listener: dyn_listener,
        };

        // Subscribe before sending so a disconnect arriving between the two
        // cannot be missed.
        let mut state_rx = self.shared.state_tx.subscribe();

        // Registration happens-before transmission: a fast peer's reply
        // always finds the listener in place.
        self.send_all(messages).await?;

        tokio::select! {
            biased;
            result = response => result.map_err(|_| RequestError::Cancelled),
            _ = state_rx.wait_for(|s| s.is_shutting_down()) => Err(RequestError::Cancelled),
        }
    }

    /// Begin closing the connection.
    ///
    /// Idempotent: calling while already closing or disconnected returns a
    /// handle that resolves immediately. Await the returned [`Closed`] to
    /// observe full disconnection.
    pub fn close(&self) -> Closed {
        let rx = self.shared.state_tx.subscribe();
        if self.shared.transition(ConnectionState::Closing) {
            debug!("close requested");
        }
        Closed { rx }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Whether the connection is currently `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Completion handle for a `send` call.
///
/// Resolves `Ok(())` once the batch has been written and flushed, or an
/// error if the write failed or the connection went down first. Dropping the
/// handle does not cancel the write.
pub struct SendHandle {
    rx: oneshot::Receiver<Result<(), SendError>>,
}

impl Future for SendHandle {
    type Output = Result<(), SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(_) => Err(SendError::ConnectionClosed),
        })
    }
}

/// Handle returned by [`Connection::close`]; resolves once the connection
/// has fully reached `Disconnected`.
pub struct Closed {
    rx: watch::Receiver<ConnectionState>,
}

impl IntoFuture for Closed {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        let mut rx = self.rx;
        Box::pin(async move {
            // A dropped sender means every task is gone, which is
            // disconnected too.
            let _ = rx.wait_for(|s| *s == ConnectionState::Disconnected).await;
        })
    }
}

/// The reader task: sole dispatcher of inbound messages.
async fn run_reader(shared: Arc<Shared>, mut reader: TransportReader) {
    let mut shutdown = shared.state_tx.subscribe();

    loop {
        tokio::select! {
            res = async { shutdown.wait_for(|s| s.is_shutting_down()).await.map(|_| ()) } => {
                let _ = res;
                debug!("reader stopping");
                break;
            }
            item = reader.next() => {
                match item {
                    Some(Ok(message)) => {
                        trace!(raw = %message, "received");
                        shared.listeners.dispatch(&message);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "transport read failed");
                        break;
                    }
                    None => {
                        info!("peer closed the connection");
                        break;
                    }
                }
            }
        }
    }

    // Committing Disconnected wakes every close() handle and cancels every
    // pending request via the state watch.
    shared.transition(ConnectionState::Disconnected);
}

/// The writer task: drains the outbound queue one batch at a time.
async fn run_writer(
    shared: Arc<Shared>,
    mut writer: TransportWriter,
    mut outgoing: mpsc::Receiver<Outbound>,
) {
    let mut shutdown = shared.state_tx.subscribe();

    loop {
        tokio::select! {
            res = async { shutdown.wait_for(|s| s.is_shutting_down()).await.map(|_| ()) } => {
                let _ = res;
                debug!("writer stopping");
                break;
            }
            batch = outgoing.recv() => {
                let Some(Outbound { messages, done }) = batch else {
                    break;
                };
                match write_batch(&mut writer, messages).await {
                    Ok(()) => {
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        warn!(error = %e, "transport write failed");
                        let _ = done.send(Err(SendError::Write(e.to_string())));
                        // A write failure tears the connection down; the
                        // reader observes the broadcast and finalizes.
                        shared.transition(ConnectionState::Disconnected);
                        break;
                    }
                }
            }
        }
    }

    // Best-effort transport shutdown; unwritten queued batches resolve their
    // handles with `ConnectionClosed` when the queue is dropped.
    let _ = writer.close().await;
}

async fn write_batch(
    writer: &mut TransportWriter,
    messages: Vec<Message>,
) -> Result<(), ProtocolError> {
    for message in messages {
        trace!(raw = %message, "sending");
        writer.feed(message).await?;
    }
    writer.flush().await
}
