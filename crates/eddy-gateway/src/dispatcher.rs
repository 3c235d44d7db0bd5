use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use eddy_poller::NotificationSink;
use eddy_types::events::GatewayEvent;

/// Manages connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for global events — all connected clients receive them
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .expect("user channel lock poisoned")
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    /// A newer connection may have taken the slot over.
    pub fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self
            .inner
            .user_channels
            .write()
            .expect("user channel lock poisoned");
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user, if connected.
    pub fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self
            .inner
            .user_channels
            .read()
            .expect("user channel lock poisoned");
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Poller sink that turns a delta into a `NewMessages` event targeted at
/// the watching user's connection.
#[derive(Clone)]
pub struct DispatcherSink {
    dispatcher: Dispatcher,
    user_id: Uuid,
}

impl DispatcherSink {
    pub fn new(dispatcher: Dispatcher, user_id: Uuid) -> Self {
        Self { dispatcher, user_id }
    }
}

impl NotificationSink for DispatcherSink {
    fn deliver(&self, conversation_id: Uuid, message_ids: Vec<i64>) -> anyhow::Result<()> {
        self.dispatcher.send_to_user(
            self.user_id,
            GatewayEvent::NewMessages { conversation_id, message_ids },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targeted_send_reaches_only_the_owner_of_the_channel() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_conn, mut alice_rx) = dispatcher.register_user_channel(alice);
        let (_conn, mut bob_rx) = dispatcher.register_user_channel(bob);

        let sink = DispatcherSink::new(dispatcher.clone(), alice);
        let convo = Uuid::new_v4();
        sink.deliver(convo, vec![4, 5]).unwrap();

        match alice_rx.try_recv().unwrap() {
            GatewayEvent::NewMessages { conversation_id, message_ids } => {
                assert_eq!(conversation_id, convo);
                assert_eq!(message_ids, vec![4, 5]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn stale_conn_id_cannot_unregister_a_newer_channel() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (old_conn, _old_rx) = dispatcher.register_user_channel(user);
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user);

        dispatcher.unregister_user_channel(user, old_conn);
        dispatcher.send_to_user(user, GatewayEvent::Ready { user_id: user, login: "ana".into() });

        assert!(new_rx.try_recv().is_ok());
    }
}
