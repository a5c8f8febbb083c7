//! In-process relay implementing the transport contract.
//!
//! `MemoryHub` plays the role of the collaboration server: it relays frames
//! between every provider connected to the same topic and keeps the CRDT
//! updates it has seen so late joiners can catch up. Frames cross the hub as
//! postcard bytes, like they would on a socket.
//!
//! The hub treats updates as opaque bytes. Without a [`Compactor`] the
//! stored history grows with every update, which is fine for tests; a hub
//! that lives longer should be built with [`MemoryHub::with_compaction`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smol_str::{SmolStr, ToSmolStr};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use super::messages::CollabMessage;
use super::provider::{ProviderEvent, TransportError, TransportFactory, TransportProvider};
use super::topic::TopicId;

/// What travels down a connection's channel.
#[derive(Debug)]
enum Frame {
    Open,
    Synced,
    Close,
    Error(TransportError),
    Data(Vec<u8>),
}

#[derive(Default)]
struct Topic {
    peers: HashMap<u64, UnboundedSender<Frame>>,
    /// Every CRDT update relayed on this topic, in arrival order.
    updates: Vec<Vec<u8>>,
}

/// Folds a topic's stored updates into one frame that imports to the same
/// state. Returning `None` keeps the updates as they are.
pub type Compactor = Arc<dyn Fn(&[Vec<u8>]) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Default)]
struct HubState {
    topics: HashMap<TopicId, Topic>,
    next_connection: u64,
    offline: bool,
    /// Stored-update count above which a topic is compacted.
    compaction: Option<(usize, Compactor)>,
}

/// Shared in-process relay. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub that folds a topic's history with `compactor` whenever it
    /// holds more than `threshold` updates.
    pub fn with_compaction(
        threshold: usize,
        compactor: impl Fn(&[Vec<u8>]) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        let hub = Self::default();
        hub.lock().compaction = Some((threshold, Arc::new(compactor)));
        hub
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A provider bound to this hub.
    pub fn provider(&self) -> MemoryProvider {
        MemoryProvider {
            hub: self.clone(),
            connection: None,
        }
    }

    /// Simulate the relay going away (`false`) or coming back (`true`).
    ///
    /// Going offline drops every live connection with `Error` then `Close`;
    /// connects attempted while offline fail the same way.
    pub fn set_online(&self, online: bool) {
        let mut state = self.lock();
        state.offline = !online;
        if online {
            return;
        }
        for topic in state.topics.values_mut() {
            for (_, peer) in topic.peers.drain() {
                let _ = peer.send(Frame::Error(TransportError::ConnectionLost));
                let _ = peer.send(Frame::Close);
            }
        }
        tracing::debug!("memory hub offline");
    }

    /// Forcibly close every connection to one document.
    pub fn drop_connections(&self, document_id: &str) {
        let mut state = self.lock();
        if let Some(topic) = state.topics.get_mut(&TopicId::for_document(document_id)) {
            for (_, peer) in topic.peers.drain() {
                let _ = peer.send(Frame::Close);
            }
        }
    }

    /// Number of live connections to a document.
    pub fn connection_count(&self, document_id: &str) -> usize {
        self.lock()
            .topics
            .get(&TopicId::for_document(document_id))
            .map_or(0, |t| t.peers.len())
    }

    /// Number of CRDT updates stored for a document.
    pub fn stored_updates(&self, document_id: &str) -> usize {
        self.lock()
            .topics
            .get(&TopicId::for_document(document_id))
            .map_or(0, |t| t.updates.len())
    }

    fn join(&self, topic: TopicId) -> Result<(u64, UnboundedReceiver<Frame>), TransportError> {
        let mut state = self.lock();
        if state.offline {
            return Err(TransportError::Unreachable("memory hub offline".into()));
        }
        state.next_connection += 1;
        let id = state.next_connection;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Frame::Open);
        state.topics.entry(topic).or_default().peers.insert(id, tx);
        Ok((id, rx))
    }

    fn leave(&self, topic: TopicId, connection: u64) {
        if let Some(topic) = self.lock().topics.get_mut(&topic) {
            topic.peers.remove(&connection);
        }
    }

    fn route(&self, topic_id: TopicId, from: u64, message: &CollabMessage) {
        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, kind = message.kind(), "failed to encode message");
                return;
            }
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(topic) = state.topics.get_mut(&topic_id) else {
            return;
        };
        if !topic.peers.contains_key(&from) {
            tracing::trace!(connection = from, "send on dropped connection ignored");
            return;
        }

        match message {
            CollabMessage::SyncRequest { .. } => {
                // The hub keeps no CRDT state of its own; replaying the stored
                // updates is enough because imports are idempotent.
                if let Some(peer) = topic.peers.get(&from) {
                    for data in &topic.updates {
                        let response = CollabMessage::SyncResponse {
                            data: data.clone(),
                            is_snapshot: false,
                        };
                        match response.to_bytes() {
                            Ok(frame) => {
                                let _ = peer.send(Frame::Data(frame));
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to encode sync response"),
                        }
                    }
                    let _ = peer.send(Frame::Synced);
                }
                return;
            }
            CollabMessage::CrdtUpdate { data, .. } => {
                topic.updates.push(data.clone());
                if let Some((threshold, compact)) = &state.compaction {
                    if topic.updates.len() > *threshold {
                        match compact(&topic.updates) {
                            Some(folded) => {
                                tracing::debug!(updates = topic.updates.len(), "compacted topic history");
                                topic.updates = vec![folded];
                            }
                            None => tracing::warn!(updates = topic.updates.len(), "topic compaction failed"),
                        }
                    }
                }
            }
            _ => {}
        }

        topic.peers.retain(|id, peer| {
            *id == from || peer.send(Frame::Data(bytes.clone())).is_ok()
        });
    }
}

impl TransportFactory for MemoryHub {
    fn create(&self) -> Box<dyn TransportProvider> {
        Box::new(self.provider())
    }
}

struct Connection {
    id: u64,
    topic: TopicId,
    rx: UnboundedReceiver<Frame>,
    closed: bool,
}

/// A connection to a [`MemoryHub`].
pub struct MemoryProvider {
    hub: MemoryHub,
    connection: Option<Connection>,
}

impl TransportProvider for MemoryProvider {
    fn connect(&mut self, document_id: &str, auth_token: Option<&str>) {
        self.disconnect();
        let topic = TopicId::for_document(document_id);
        tracing::debug!(
            document = document_id,
            ?topic,
            authenticated = auth_token.is_some(),
            "connecting to memory hub"
        );
        match self.hub.join(topic) {
            Ok((id, rx)) => {
                self.connection = Some(Connection {
                    id,
                    topic,
                    rx,
                    closed: false,
                });
            }
            Err(e) => {
                // Surface the failure through the event stream like a real
                // socket would.
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(Frame::Error(e));
                let _ = tx.send(Frame::Close);
                self.connection = Some(Connection {
                    id: 0,
                    topic,
                    rx,
                    closed: true,
                });
            }
        }
    }

    fn send(&mut self, message: CollabMessage) {
        match &self.connection {
            Some(conn) if !conn.closed => self.hub.route(conn.topic, conn.id, &message),
            _ => tracing::trace!(kind = message.kind(), "dropping message while disconnected"),
        }
    }

    fn try_next_event(&mut self) -> Option<ProviderEvent> {
        let conn = self.connection.as_mut()?;
        let frame = match conn.rx.try_recv() {
            Ok(frame) => frame,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                if conn.closed {
                    return None;
                }
                conn.closed = true;
                return Some(ProviderEvent::Close);
            }
        };
        Some(match frame {
            Frame::Open => ProviderEvent::Open,
            Frame::Synced => ProviderEvent::Synced,
            Frame::Close => {
                conn.closed = true;
                ProviderEvent::Close
            }
            Frame::Error(e) => ProviderEvent::Error(e),
            Frame::Data(bytes) => match CollabMessage::from_bytes(&bytes) {
                Ok(message) => ProviderEvent::Message(message),
                Err(e) => ProviderEvent::Error(TransportError::Decode(e.to_smolstr())),
            },
        })
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.hub.leave(conn.topic, conn.id);
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.closed)
    }
}

impl Drop for MemoryProvider {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(provider: &mut MemoryProvider) -> Vec<ProviderEvent> {
        std::iter::from_fn(|| provider.try_next_event()).collect()
    }

    fn update(byte: u8) -> CollabMessage {
        CollabMessage::CrdtUpdate {
            data: vec![byte],
            version: vec![],
        }
    }

    #[test]
    fn test_open_then_relay_to_others_only() {
        let hub = MemoryHub::new();
        let mut a = hub.provider();
        let mut b = hub.provider();
        a.connect("doc", None);
        b.connect("doc", Some("token"));
        assert_eq!(drain(&mut a), vec![ProviderEvent::Open]);
        assert_eq!(drain(&mut b), vec![ProviderEvent::Open]);

        a.send(update(1));
        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec![ProviderEvent::Message(update(1))]);
    }

    #[test]
    fn test_documents_are_isolated() {
        let hub = MemoryHub::new();
        let mut a = hub.provider();
        let mut b = hub.provider();
        a.connect("one", None);
        b.connect("two", None);
        drain(&mut b);
        a.send(update(1));
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_late_joiner_catches_up() {
        let hub = MemoryHub::new();
        let mut a = hub.provider();
        a.connect("doc", None);
        a.send(update(1));
        a.send(update(2));

        let mut late = hub.provider();
        late.connect("doc", None);
        late.send(CollabMessage::SyncRequest {
            have_version: vec![],
        });
        let events = drain(&mut late);
        assert_eq!(events.first(), Some(&ProviderEvent::Open));
        assert_eq!(events.last(), Some(&ProviderEvent::Synced));
        assert_eq!(events.len(), 4);
        assert_eq!(hub.stored_updates("doc"), 2);
    }

    #[test]
    fn test_history_is_compacted_past_threshold() {
        let hub = MemoryHub::with_compaction(3, |updates| Some(updates.concat()));
        let mut a = hub.provider();
        a.connect("doc", None);
        for byte in 1..=3 {
            a.send(update(byte));
        }
        assert_eq!(hub.stored_updates("doc"), 3);
        a.send(update(4));
        assert_eq!(hub.stored_updates("doc"), 1);

        let mut late = hub.provider();
        late.connect("doc", None);
        late.send(CollabMessage::SyncRequest {
            have_version: vec![],
        });
        let events = drain(&mut late);
        assert_eq!(
            events[1],
            ProviderEvent::Message(CollabMessage::SyncResponse {
                data: vec![1, 2, 3, 4],
                is_snapshot: false,
            })
        );
    }

    #[test]
    fn test_offline_connect_fails_with_error_then_close() {
        let hub = MemoryHub::new();
        hub.set_online(false);
        let mut a = hub.provider();
        a.connect("doc", None);
        let events = drain(&mut a);
        assert!(matches!(
            events.as_slice(),
            [ProviderEvent::Error(TransportError::Unreachable(_)), ProviderEvent::Close]
        ));
        assert!(!a.is_connected());
    }

    #[test]
    fn test_forced_drop_closes_connection() {
        let hub = MemoryHub::new();
        let mut a = hub.provider();
        a.connect("doc", None);
        drain(&mut a);
        hub.drop_connections("doc");
        assert_eq!(drain(&mut a), vec![ProviderEvent::Close]);
        assert!(!a.is_connected());
        assert_eq!(hub.connection_count("doc"), 0);

        // sending after a drop is a no-op
        a.send(update(3));
        assert_eq!(hub.stored_updates("doc"), 0);
    }

    #[test]
    fn test_disconnect_and_drop_leave_topic() {
        let hub = MemoryHub::new();
        let mut a = hub.provider();
        a.connect("doc", None);
        {
            let mut b = hub.create();
            b.connect("doc", None);
            assert_eq!(hub.connection_count("doc"), 2);
        }
        assert_eq!(hub.connection_count("doc"), 1);
        a.disconnect();
        assert_eq!(hub.connection_count("doc"), 0);
        assert_eq!(a.try_next_event(), None);
    }
}
