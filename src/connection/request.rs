//! Request/response correlation.
//!
//! A request is an ephemeral listener plus a completion signal. The listener
//! is registered in the ordinary [`ListenerRegistry`](super::registry) under
//! `match OR terminal`, so it shares the dispatch path (and the ordering
//! guarantees) of every other listener: the reader task is the only writer of
//! the accumulator, and the waiting task reads it only after the oneshot
//! fires, which establishes the necessary happens-before edge.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::filter::MessageFilter;
use crate::message::Message;

use super::registry::{ListenerRegistry, MessageListener};

/// The ephemeral listener backing one `request()` call.
pub(crate) struct RequestListener {
    match_filter: MessageFilter,
    terminal_filter: MessageFilter,
    state: Mutex<RequestState>,
}

struct RequestState {
    collected: Vec<Message>,
    /// Present until the terminal message arrives; taken exactly once.
    tx: Option<oneshot::Sender<Vec<Message>>>,
}

impl RequestListener {
    /// Create the listener and the receiver its completion will signal.
    pub(crate) fn new(
        match_filter: MessageFilter,
        terminal_filter: MessageFilter,
    ) -> (Arc<Self>, oneshot::Receiver<Vec<Message>>) {
        let (tx, rx) = oneshot::channel();
        let listener = Arc::new(Self {
            match_filter,
            terminal_filter,
            state: Mutex::new(RequestState {
                collected: Vec::new(),
                tx: Some(tx),
            }),
        });
        (listener, rx)
    }

    /// The filter this listener registers under: anything the caller wants
    /// accumulated, plus the terminal marker.
    pub(crate) fn subscription_filter(&self) -> MessageFilter {
        self.match_filter.clone().or(self.terminal_filter.clone())
    }
}

impl MessageListener for RequestListener {
    fn on_message(&self, message: &Message) {
        let mut state = self.state.lock();
        if state.tx.is_none() {
            // Already completed; awaiting deregistration.
            return;
        }

        // A message matching both filters is terminal: appended once, never
        // double-counted.
        if self.terminal_filter.matches(message) {
            state.collected.push(message.clone());
            let collected = mem::take(&mut state.collected);
            if let Some(tx) = state.tx.take() {
                let _ = tx.send(collected);
            }
        } else if self.match_filter.matches(message) {
            state.collected.push(message.clone());
        }
    }
}

/// Deregisters the ephemeral listener on every exit path of `request()`,
/// including the caller dropping the future mid-wait.
pub(crate) struct DeregisterOnDrop<'a> {
    pub(crate) registry: &'a ListenerRegistry,
    pub(crate) listener: Arc<dyn MessageListener>,
}

impl Drop for DeregisterOnDrop<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.listener);
    }
}
