//! Publish/subscribe broker.
//!
//! Each `(client, channel)` subscription owns a bounded queue and a
//! delivery worker task that forwards queued messages into the
//! client's [`MessageSink`]. Publishing is non-blocking best-effort: a
//! full queue drops the message for that subscriber. Dropping the
//! sending half (unsubscribe) drains and stops the worker.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ClientId;

/// Buffered messages per subscription before publishes start dropping.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// Where a subscriber's messages go. One implementation per transport:
/// the TCP connection's write queue, the WebSocket write queue, and an
/// in-memory outbox for tests.
pub trait MessageSink: Send + Sync {
    /// Hands one message to the client. Returns `false` when the sink
    /// is gone and the delivery worker should stop.
    fn deliver(&self, channel: &str, payload: &str) -> bool;
}

/// Sink for line-protocol TCP clients: frames each message with CRLF
/// and hands it to the connection task's writer queue.
pub struct TcpSink {
    tx: mpsc::UnboundedSender<String>,
}

impl TcpSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl MessageSink for TcpSink {
    fn deliver(&self, _channel: &str, payload: &str) -> bool {
        self.tx.send(format!("{payload}\r\n")).is_ok()
    }
}

/// Sink for WebSocket clients: one delivered message becomes one text
/// frame, no extra framing.
pub struct WsSink {
    tx: mpsc::UnboundedSender<String>,
}

impl WsSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl MessageSink for WsSink {
    fn deliver(&self, _channel: &str, payload: &str) -> bool {
        self.tx.send(payload.to_owned()).is_ok()
    }
}

/// In-memory sink capturing delivered messages for inspection.
#[derive(Default)]
pub struct OutboxSink {
    messages: Mutex<Vec<String>>,
}

impl OutboxSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages delivered so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl MessageSink for OutboxSink {
    fn deliver(&self, _channel: &str, payload: &str) -> bool {
        self.messages.lock().push(payload.to_owned());
        true
    }
}

/// Channel registry: channel name → (client id → subscription queue).
#[derive(Default)]
pub struct PubSub {
    channels: DashMap<String, HashMap<ClientId, mpsc::Sender<String>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a client, creating the channel as needed and spawning
    /// the delivery worker. Idempotent per `(client, channel)` —
    /// returns `false` when already subscribed.
    pub fn subscribe(
        &self,
        client: ClientId,
        channel: &str,
        sink: Arc<dyn MessageSink>,
    ) -> bool {
        let mut subscribers = self.channels.entry(channel.to_owned()).or_default();
        if subscribers.contains_key(&client) {
            return false;
        }

        let (tx, mut rx) = mpsc::channel::<String>(SUBSCRIBER_QUEUE_CAPACITY);
        subscribers.insert(client, tx);

        let channel = channel.to_owned();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !sink.deliver(&channel, &message) {
                    debug!(%channel, client, "subscriber sink closed, stopping delivery");
                    break;
                }
            }
        });
        true
    }

    /// Removes a subscription, closing its queue so the worker exits
    /// after draining. Empty channels are removed from the registry.
    pub fn unsubscribe(&self, client: ClientId, channel: &str) -> bool {
        let removed = match self.channels.get_mut(channel) {
            Some(mut subscribers) => subscribers.remove(&client).is_some(),
            None => false,
        };
        self.channels.remove_if(channel, |_, subs| subs.is_empty());
        removed
    }

    /// Publishes to every subscriber queue on the channel. Returns the
    /// number of queues that accepted the message; full queues drop it.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        match self.channels.get(channel) {
            None => 0,
            Some(subscribers) => subscribers
                .values()
                .filter(|tx| tx.try_send(message.to_owned()).is_ok())
                .count(),
        }
    }

    /// Drops every subscription a client holds. Called when its
    /// connection goes away.
    pub fn drop_client(&self, client: ClientId) {
        for mut entry in self.channels.iter_mut() {
            entry.value_mut().remove(&client);
        }
        self.channels.retain(|_, subs| !subs.is_empty());
    }

    /// Number of subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |subs| subs.len())
    }
}
