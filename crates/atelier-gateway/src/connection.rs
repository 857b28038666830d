use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use atelier_db::Database;
use atelier_types::events::{GatewayCommand, GatewayEvent};
use atelier_types::models::MessageKind;

use crate::bus::Scope;
use crate::dispatcher::Dispatcher;
use crate::notify::Notifier;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const MAX_MESSAGE_CHARS: usize = 4000;

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("blocking task panicked: {e}"))?
}

/// Handle one authenticated chat-namespace connection. The bearer token was
/// already validated at the HTTP upgrade layer, so we register, subscribe the
/// connection to the user's rooms and go straight to Ready + event loop.
pub async fn handle_chat_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    nickname: String,
) {
    let conn_id = Uuid::new_v4();

    // Membership snapshot for fan-out; authorization is re-checked against
    // the database on every sensitive command.
    let rooms = {
        let db = db.clone();
        match blocking(move || db.rooms_of(user_id)).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!("{} ({}) failed to load rooms: {}", nickname, user_id, e);
                return;
            }
        }
    };

    let (mut sender, receiver) = socket.split();

    let ready = GatewayEvent::Ready { user_id };
    if sender
        .send(WsMessage::Text(
            serde_json::to_string(&ready).unwrap().into(),
        ))
        .await
        .is_err()
    {
        return;
    }

    dispatcher.registry().register(user_id, conn_id);
    info!("{} ({}) connected to chat gateway", nickname, user_id);

    let session = ChatSession {
        dispatcher: dispatcher.clone(),
        db: db.clone(),
        notifier: Notifier::new(db, dispatcher.clone()),
        user_id,
        nickname: nickname.clone(),
        conn_id,
        subscriptions: Arc::new(RwLock::new(rooms.into_iter().collect())),
    };

    run_chat_loop(sender, receiver, session).await;

    dispatcher.registry().unregister(conn_id);
    info!("{} ({}) disconnected from chat gateway", nickname, user_id);
}

struct ChatSession {
    dispatcher: Dispatcher,
    db: Arc<Database>,
    notifier: Notifier,
    user_id: Uuid,
    nickname: String,
    conn_id: Uuid,
    subscriptions: Arc<RwLock<HashSet<Uuid>>>,
}

async fn run_chat_loop(
    mut sender: SplitSink<WebSocket, WsMessage>,
    mut receiver: SplitStream<WebSocket>,
    session: ChatSession,
) {
    let conn_id = session.conn_id;
    let send_subscriptions = session.subscriptions.clone();
    let mut bus_rx = session.dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward matching envelopes -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = bus_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Chat receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let deliver = match envelope.scope {
                        Scope::Room(room_id) => {
                            envelope.except_conn != Some(conn_id)
                                && send_subscriptions
                                    .read()
                                    .expect("subscription lock poisoned")
                                    .contains(&room_id)
                        }
                        Scope::Connection(target) => target == conn_id,
                        // Notification traffic stays on its own namespace.
                        Scope::User(_) => false,
                    };
                    if !deliver {
                        continue;
                    }

                    let text = serde_json::to_string(&envelope.event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
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
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle_command(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            session.nickname,
                            session.user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        session.reject("잘못된 요청입니다");
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

impl ChatSession {
    async fn handle_command(&self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::JoinRoom { room_id } => self.join_room(room_id).await,
            GatewayCommand::SendMessage {
                room_id,
                content,
                kind,
                file_url,
            } => {
                self.send_message(room_id, content, kind, file_url).await;
            }
            GatewayCommand::Typing { room_id, is_typing } => {
                self.dispatcher.to_room_except(
                    room_id,
                    self.conn_id,
                    GatewayEvent::UserTyping {
                        room_id,
                        user_id: self.user_id,
                        is_typing,
                    },
                );
            }
            GatewayCommand::MarkRead { room_id } => self.mark_read(room_id).await,
        }
    }

    /// Inline failure ack to this connection only; rejected commands are
    /// never silently dropped.
    fn reject(&self, message: &str) {
        self.dispatcher.to_connection(
            self.conn_id,
            GatewayEvent::Error {
                message: message.to_string(),
            },
        );
    }

    async fn is_member(&self, room_id: Uuid) -> Option<bool> {
        let db = self.db.clone();
        let user_id = self.user_id;
        match blocking(move || db.is_member(room_id, user_id)).await {
            Ok(member) => Some(member),
            Err(e) => {
                warn!("membership check failed for room {}: {}", room_id, e);
                self.reject("요청을 처리할 수 없습니다");
                None
            }
        }
    }

    async fn join_room(&self, room_id: Uuid) {
        match self.is_member(room_id).await {
            Some(true) => {}
            Some(false) => return self.reject("권한이 없습니다"),
            None => return,
        }

        self.subscriptions
            .write()
            .expect("subscription lock poisoned")
            .insert(room_id);

        let db = self.db.clone();
        let user_id = self.user_id;
        if let Err(e) = blocking(move || db.mark_read(room_id, user_id)).await {
            warn!("mark_read on join failed for room {}: {}", room_id, e);
        }

        self.dispatcher
            .to_connection(self.conn_id, GatewayEvent::RoomJoined { room_id });
    }

    async fn send_message(
        &self,
        room_id: Uuid,
        content: String,
        kind: Option<MessageKind>,
        file_url: Option<String>,
    ) {
        let kind = kind.unwrap_or(MessageKind::Text);
        // SYSTEM messages are authored by the platform, never by clients.
        if kind == MessageKind::System {
            return self.reject("메시지 형식이 올바르지 않습니다");
        }
        if content.trim().is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
            return self.reject("메시지 내용이 올바르지 않습니다");
        }

        match self.is_member(room_id).await {
            Some(true) => {}
            Some(false) => return self.reject("권한이 없습니다"),
            None => return,
        }

        let message = {
            let db = self.db.clone();
            let sender_id = self.user_id;
            let body = content.clone();
            match blocking(move || {
                db.append_message(room_id, sender_id, &body, kind, file_url.as_deref())
            })
            .await
            {
                Ok(message) => message,
                Err(e) => {
                    warn!("failed to append message to room {}: {}", room_id, e);
                    return self.reject("메시지를 저장하지 못했습니다");
                }
            }
        };

        self.dispatcher
            .to_room(room_id, GatewayEvent::MessageReceived(message));

        // Members without a live chat connection get an in-app notification.
        let members = {
            let db = self.db.clone();
            blocking(move || db.room_member_ids(room_id))
                .await
                .unwrap_or_default()
        };
        for member in members {
            if member == self.user_id || self.dispatcher.registry().is_online(member) {
                continue;
            }
            if let Err(e) = self
                .notifier
                .chat_message(member, &self.nickname, &content, room_id)
                .await
            {
                warn!("chat notification for {} failed: {}", member, e);
            }
        }
    }

    async fn mark_read(&self, room_id: Uuid) {
        match self.is_member(room_id).await {
            Some(true) => {}
            Some(false) => return self.reject("권한이 없습니다"),
            None => return,
        }

        let db = self.db.clone();
        let user_id = self.user_id;
        if let Err(e) = blocking(move || db.mark_read(room_id, user_id)).await {
            warn!("mark_read failed for room {}: {}", room_id, e);
            return self.reject("요청을 처리할 수 없습니다");
        }

        self.dispatcher.to_room_except(
            room_id,
            self.conn_id,
            GatewayEvent::MessagesRead {
                user_id: self.user_id,
                room_id,
            },
        );
    }
}

/// Handle one authenticated notifications-namespace connection: a pure
/// outbound stream of `notification` / `unread_count` events for this user.
pub async fn handle_notifications_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    user_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut bus_rx = dispatcher.subscribe();

    info!("{} connected to notifications gateway", user_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = bus_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Notifications receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if envelope.scope != Scope::User(user_id) {
                        continue;
                    }

                    let text = serde_json::to_string(&envelope.event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
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
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from notifications gateway", user_id);
}
