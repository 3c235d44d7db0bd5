use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use eddy_db::Database;
use eddy_poller::{DeliveryPoller, PollWorker, PollerHandle};
use eddy_types::api::Claims;
use eddy_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::{Dispatcher, DispatcherSink};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A running per-(user, conversation) poll loop.
struct Watch {
    handle: PollerHandle,
    task: JoinHandle<()>,
}

/// Handle a single WebSocket connection: Identify handshake, then a
/// command loop in which `Watch` spawns a delivery poller per
/// conversation and `Pause`/`Resume` drive its handle.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
    poll_interval: Duration,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, login) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", login, user_id);

    let ready = GatewayEvent::Ready { user_id, login: login.clone() };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Targeted channel: poller deltas and command acks arrive here
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id);

    // Active watches, shared with the command handler for cleanup
    let watches: Arc<Mutex<HashMap<Uuid, Watch>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let login_recv = login.clone();
    let dispatcher_recv = dispatcher.clone();
    let db_recv = db.clone();
    let watches_recv = watches.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &dispatcher_recv,
                            &db_recv,
                            user_id,
                            &login_recv,
                            cmd,
                            &watches_recv,
                            poll_interval,
                        );
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            login_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Stop every poll loop this connection owned
    for (_, watch) in watches.lock().expect("watch lock poisoned").drain() {
        watch.task.abort();
    }
    dispatcher.unregister_user_channel(user_id, conn_id);
    info!("{} ({}) disconnected from gateway", login, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.login));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    login: &str,
    cmd: GatewayCommand,
    watches: &Arc<Mutex<HashMap<Uuid, Watch>>>,
    poll_interval: Duration,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Watch { conversation_id } => {
            let mut watches = watches.lock().expect("watch lock poisoned");
            if let Some(watch) = watches.get(&conversation_id) {
                // already watching; re-ack with the current position
                dispatcher.send_to_user(
                    user_id,
                    GatewayEvent::Watching {
                        conversation_id,
                        last_seen_id: watch.handle.last_seen_id(),
                    },
                );
                return;
            }

            match db.get_conversation(&conversation_id.to_string()) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!("{} ({}) tried to watch unknown conversation {}", login, user_id, conversation_id);
                    return;
                }
                Err(e) => {
                    warn!("watch lookup failed for {}: {}", conversation_id, e);
                    return;
                }
            }

            let sink = DispatcherSink::new(dispatcher.clone(), user_id);
            match DeliveryPoller::new(db.clone(), sink, conversation_id) {
                Ok(poller) => {
                    info!("{} ({}) watching {}", login, user_id, conversation_id);
                    let handle = poller.handle();
                    let last_seen_id = poller.last_seen_id();
                    let task = tokio::spawn(PollWorker::new(poller, poll_interval).run());
                    watches.insert(conversation_id, Watch { handle, task });
                    dispatcher.send_to_user(
                        user_id,
                        GatewayEvent::Watching { conversation_id, last_seen_id },
                    );
                }
                Err(e) => {
                    warn!("failed to start poller for {}: {}", conversation_id, e);
                }
            }
        }

        GatewayCommand::Unwatch { conversation_id } => {
            if let Some(watch) = watches.lock().expect("watch lock poisoned").remove(&conversation_id) {
                watch.task.abort();
                info!("{} ({}) unwatched {}", login, user_id, conversation_id);
            }
        }

        GatewayCommand::Pause { conversation_id } => {
            let watches = watches.lock().expect("watch lock poisoned");
            if let Some(watch) = watches.get(&conversation_id) {
                watch.handle.suspend();
                dispatcher.send_to_user(user_id, poller_state(conversation_id, &watch.handle));
            }
        }

        GatewayCommand::Resume { conversation_id } => {
            let watches = watches.lock().expect("watch lock poisoned");
            if let Some(watch) = watches.get(&conversation_id) {
                watch.handle.resume();
                dispatcher.send_to_user(user_id, poller_state(conversation_id, &watch.handle));
            }
        }

        GatewayCommand::Status { conversation_id } => {
            let watches = watches.lock().expect("watch lock poisoned");
            if let Some(watch) = watches.get(&conversation_id) {
                dispatcher.send_to_user(user_id, poller_state(conversation_id, &watch.handle));
            }
        }
    }
}

fn poller_state(conversation_id: Uuid, handle: &PollerHandle) -> GatewayEvent {
    GatewayEvent::PollerState {
        conversation_id,
        suspended: handle.is_suspended(),
        busy: handle.is_busy(),
        last_seen_id: handle.last_seen_id(),
    }
}
