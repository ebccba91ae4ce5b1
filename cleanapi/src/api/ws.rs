use crate::core::prelude::*;
use crate::domain::prelude::*;
use crate::stream::tracking::{channel_name, ChannelHandle, Subscription};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use client::WsClient;
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use models::{ChannelMsg, StatusData, WsMessage};
use tokio::sync::{broadcast, mpsc};

/// Module for models for the websocket API.
///
/// This module includes the message types for the websocket API: the
/// subscribe and unsubscribe requests a client sends, and every event the
/// server pushes back.
///
pub mod models {
    use crate::domain::prelude::*;
    use crate::stream::tracking::ConnectionStatus;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Serialize, Debug)]
    #[serde(tag = "method")]
    pub enum WsMessage {
        #[serde(rename = "subscribe")]
        Subscribe { params: BookingParams },
        #[serde(rename = "unsubscribe")]
        Unsubscribe { params: BookingParams },
    }

    #[derive(Deserialize, Serialize, Debug)]
    pub struct BookingParams {
        pub booking_id: Uuid,
    }

    #[derive(Deserialize, Serialize, Debug)]
    #[serde(tag = "event", rename_all = "snake_case")]
    pub enum ChannelMsg {
        /// Answer to a subscribe/unsubscribe request.
        Status { data: StatusData },

        /// The persisted booking row, sent right after subscribing.
        Snapshot { channel: String, data: Booking },

        LocationUpdate { channel: String, data: TrackingUpdate },

        Connection { channel: String, data: ConnectionStatus },

        Heartbeat { data: Heartbeat },
    }

    #[derive(Deserialize, Serialize, Debug, PartialEq)]
    pub struct StatusData {
        pub ok: bool,
        pub message: String,
    }
}

/// Module for the websocket client.
///
/// This module includes the client struct which owns the booking
/// subscriptions of one websocket connection.
///
pub mod client {
    use super::models::ChannelMsg;
    use crate::core::session::Session;
    use crate::stream::tracking::{ChannelHandle, Subscription, TrackingHub};
    use std::collections::HashMap;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// The websocket client struct.
    ///
    /// Everything meant for the socket goes through `outbox`, so booking
    /// updates, replies and heartbeats are written by a single task.
    ///
    #[derive(Debug)]
    pub struct WsClient {
        pub session: Session,
        outbox: mpsc::UnboundedSender<ChannelMsg>,
        subscriptions: HashMap<Uuid, (ChannelHandle, Subscription)>,
    }

    impl WsClient {
        pub fn new(session: Session, outbox: mpsc::UnboundedSender<ChannelMsg>) -> Self {
            Self {
                session,
                outbox,
                subscriptions: HashMap::new(),
            }
        }

        /// Queues a message for the socket. A closed socket drops it.
        pub fn send(&self, msg: ChannelMsg) {
            let _ = self.outbox.send(msg);
        }

        pub fn outbox(&self) -> mpsc::UnboundedSender<ChannelMsg> {
            self.outbox.clone()
        }

        pub fn is_subscribed(&self, booking_id: Uuid) -> bool {
            self.subscriptions.contains_key(&booking_id)
        }

        pub fn subscribe(&mut self, handle: ChannelHandle, subscription: Subscription) {
            self.subscriptions.insert(handle.booking_id, (handle, subscription));
        }

        /// Releases one booking subscription. Returns false if there was none.
        pub async fn unsubscribe(&mut self, hub: &TrackingHub, booking_id: Uuid) -> bool {
            match self.subscriptions.remove(&booking_id) {
                Some((handle, subscription)) => {
                    subscription.unsubscribe().await;
                    hub.close_channel(handle);
                    true
                }
                None => false,
            }
        }

        /// Releases every subscription, when the socket goes away.
        pub async fn close(mut self, hub: &TrackingHub) {
            for (_, (handle, subscription)) in self.subscriptions.drain() {
                subscription.unsubscribe().await;
                hub.close_channel(handle);
            }
        }
    }
}

/// The endpoint for the websocket API.
///
/// This function upgrades the websocket connection for the calling session
/// and handles the incoming messages.
///
pub async fn endpoint(
    ws: WebSocketUpgrade,
    session: Session,
    State(state): State<AppState>,
) -> impl IntoResponse {
    /// Handles one websocket connection.
    ///
    /// This function splits the websocket into a sink and stream, and then
    /// creates a channel for messages between the websocket and the server.
    ///
    /// It then spawns two tasks to handle the reading and writing of messages.
    ///
    async fn handle(socket: WebSocket, session: Session, state: AppState) {
        let (sender, receiver) = socket.split();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let client = WsClient::new(session, outbox_tx);
        tracing::debug!("websocket opened for {}", session.user_id);

        let read_task = tokio::spawn(read(receiver, client, state.clone()));
        let write_task = tokio::spawn(write(sender, outbox_rx, state.heartbeat_tx.subscribe()));

        tokio::select! {
            _ = read_task => {},
            _ = write_task => {},
        }
        tracing::debug!("websocket closed for {}", session.user_id);
    }
    // upgrade the websocket connection using the ws handler
    ws.on_upgrade(move |socket| handle(socket, session, state))
}

/// Read side of the websocket connection.
///
/// This function reads requests from the websocket until it closes, then
/// releases every subscription the client still holds.
///
async fn read(mut receiver: SplitStream<WebSocket>, mut client: WsClient, state: AppState) {
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<WsMessage>(&text) {
                Ok(ws_msg) => handle_message(&ws_msg, &mut client, &state).await,
                Err(err) => {
                    tracing::debug!("unreadable websocket message: {}", err);
                    client.send(status(false, "Invalid message".to_string()));
                }
            }
        }
    }
    client.close(&state.tracking).await;
}

/// Write side of the websocket connection.
///
/// This function writes the client's queued messages and the heartbeats to
/// the websocket, until either the client or the socket goes away.
///
async fn write(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ChannelMsg>,
    mut heartbeat_rx: broadcast::Receiver<Heartbeat>,
) {
    loop {
        let msg = tokio::select! {
            msg = outbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            beat = heartbeat_rx.recv() => match beat {
                Ok(data) => ChannelMsg::Heartbeat { data },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if send_message(&msg, &mut sender).await.is_err() {
            break;
        }
    }
}

fn status(ok: bool, message: String) -> ChannelMsg {
    ChannelMsg::Status {
        data: StatusData { ok, message },
    }
}

/// Handles one request from the websocket.
///
/// A subscribe is answered with a status message, then the booking's
/// persisted row, then every live update on its channel. Only the booking's
/// customer and its assigned cleaner may subscribe.
///
/// The listener is attached before the row is read. Whatever it hears
/// meanwhile is held back until the snapshot has been queued, so an update
/// racing the read is delivered after the snapshot instead of being lost.
///
async fn handle_message(msg: &WsMessage, client: &mut WsClient, state: &AppState) {
    match msg {
        WsMessage::Subscribe { params } => {
            let booking_id = params.booking_id;
            let channel = channel_name(booking_id);
            if client.is_subscribed(booking_id) {
                client.send(status(true, format!("Already subscribed to {channel}")));
                return;
            }

            let handle = state.tracking.open_channel(booking_id);
            let (held_tx, held_rx) = mpsc::unbounded_channel();
            let subscription = listen(state, &handle, &channel, held_tx);

            let session = client.session;
            let rejection = match state.bookings.get(&session, booking_id).await {
                Ok(booking)
                    if booking.customer_id == session.user_id
                        || booking.is_assigned_to(session.user_id) =>
                {
                    client.send(status(true, format!("Successfully subscribed to {channel}")));
                    let since = booking.updated_at;
                    client.send(ChannelMsg::Snapshot {
                        channel,
                        data: booking,
                    });
                    tokio::spawn(release_held(held_rx, client.outbox(), since));
                    client.subscribe(handle, subscription);
                    return;
                }
                Ok(_) => format!("Not allowed to follow {channel}"),
                Err(err) => err.public_message(),
            };

            subscription.unsubscribe().await;
            state.tracking.close_channel(handle);
            client.send(status(false, rejection));
        }

        WsMessage::Unsubscribe { params } => {
            let channel = channel_name(params.booking_id);
            if client.unsubscribe(&state.tracking, params.booking_id).await {
                client.send(status(true, format!("Successfully unsubscribed from {channel}")));
            } else {
                client.send(status(false, format!("Not subscribed to {channel}")));
            }
        }
    }
}

/// Subscribes to a booking topic, wrapping every update and connection
/// change as a websocket event on `held`.
fn listen(
    state: &AppState,
    handle: &ChannelHandle,
    channel: &str,
    held: mpsc::UnboundedSender<ChannelMsg>,
) -> Subscription {
    let statuses = held.clone();
    let (update_channel, status_channel) = (channel.to_string(), channel.to_string());
    state.tracking.subscribe(
        handle,
        move |data| {
            let _ = held.send(ChannelMsg::LocationUpdate {
                channel: update_channel.clone(),
                data,
            });
        },
        move |data| {
            let _ = statuses.send(ChannelMsg::Connection {
                channel: status_channel.clone(),
                data,
            });
        },
    )
}

/// Moves held events to the client once its snapshot is out. Location
/// updates older than the snapshot are dropped. Ends with the subscription.
async fn release_held(
    mut held: mpsc::UnboundedReceiver<ChannelMsg>,
    outbox: mpsc::UnboundedSender<ChannelMsg>,
    since: DateTime<Utc>,
) {
    while let Some(msg) = held.recv().await {
        if let ChannelMsg::LocationUpdate { data, .. } = &msg {
            if data.timestamp < since {
                continue;
            }
        }
        if outbox.send(msg).is_err() {
            break;
        }
    }
}

/// Sends a message by serializing the message and sending it to the websocket.
///
/// # Arguments
///
/// * `msg` - The message to send to the websocket.
/// * `sender` - The websocket sender to send the message to.
///
async fn send_message(msg: &ChannelMsg, sender: &mut SplitSink<WebSocket, Message>) -> Result<(), axum::Error> {
    match serde_json::to_string(&msg) {
        Ok(serialized) => sender.send(Message::Text(serialized.into())).await,
        Err(err) => {
            tracing::error!("could not serialize websocket message: {}", err);
            Ok(())
        }
    }
}
