use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::prelude::*;

/// Default number of updates buffered per booking channel before a slow
/// subscriber starts missing messages.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Name of the topic a booking's updates are published on.
pub fn channel_name(booking_id: Uuid) -> String {
    format!("booking_{booking_id}")
}

/// Connection lifecycle reported to a subscriber.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ConnectionStatus {
    Connecting,
    Subscribed,
    Disconnected,
    Error(String),
}

#[derive(Debug)]
struct Topic {
    tx: broadcast::Sender<TrackingUpdate>,
    /// Open `ChannelHandle`s on this topic.
    handles: usize,
}

type Registry = Arc<Mutex<HashMap<Uuid, Topic>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<Uuid, Topic>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drops the topic once no handle is open on it and nobody listens.
fn prune(channels: &mut HashMap<Uuid, Topic>, booking_id: Uuid, tx: &broadcast::Sender<TrackingUpdate>) {
    let idle = channels.get(&booking_id).is_some_and(|topic| {
        topic.tx.same_channel(tx) && topic.handles == 0 && topic.tx.receiver_count() == 0
    });
    if idle {
        channels.remove(&booking_id);
        tracing::debug!("closed channel {}", channel_name(booking_id));
    }
}

/// Registry of per-booking broadcast topics.
///
/// Each booking id maps to one `broadcast` channel. Publishing is
/// fire-and-forget: a subscriber that is not connected when an update is sent
/// never sees it, and nothing is replayed. The booking row is the durable
/// state; these channels only push fresh updates to live viewers.
///
/// A topic lives as long as any `ChannelHandle` or `Subscription` on it, so
/// everyone opening the same id meets on the same sender.
///
#[derive(Debug, Clone)]
pub struct TrackingHub {
    channels: Registry,
    buffer_size: usize,
}

impl Default for TrackingHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Handle on one booking's topic. Releasing it (`close_channel` or drop)
/// never disturbs other holders of the same topic.
#[derive(Debug)]
pub struct ChannelHandle {
    pub booking_id: Uuid,
    tx: broadcast::Sender<TrackingUpdate>,
    registry: Registry,
}

impl ChannelHandle {
    pub fn name(&self) -> String {
        channel_name(self.booking_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let mut channels = lock(&self.registry);
        if let Some(topic) = channels.get_mut(&self.booking_id) {
            if topic.tx.same_channel(&self.tx) {
                topic.handles = topic.handles.saturating_sub(1);
            }
        }
        prune(&mut channels, self.booking_id, &self.tx);
    }
}

/// A live registration on a booking channel.
///
/// The listener task stops when the subscription is unsubscribed or dropped,
/// whichever comes first.
///
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub booking_id: Uuid,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stops the listener and waits until it has reported `disconnected`.
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!("subscription {} on booking {} released", self.id, self.booking_id);
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl TrackingHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Opens the topic for a booking, creating it on first use. Every caller
    /// passing the same id shares one topic until the last handle and the
    /// last subscription on it are gone.
    pub fn open_channel(&self, booking_id: Uuid) -> ChannelHandle {
        let mut channels = lock(&self.channels);
        let topic = channels.entry(booking_id).or_insert_with(|| {
            tracing::debug!("opening channel {}", channel_name(booking_id));
            Topic {
                tx: broadcast::channel(self.buffer_size).0,
                handles: 0,
            }
        });
        topic.handles += 1;
        ChannelHandle {
            booking_id,
            tx: topic.tx.clone(),
            registry: self.channels.clone(),
        }
    }

    /// Releases a handle. The topic is dropped from the registry once no
    /// other handle is open on it and nobody is subscribed.
    pub fn close_channel(&self, handle: ChannelHandle) {
        drop(handle);
    }

    pub fn open_channels(&self) -> usize {
        lock(&self.channels).len()
    }

    /// Sends an update to everyone currently subscribed to the handle's topic
    /// and returns how many subscribers it reached. Having no subscribers is
    /// not an error.
    pub fn publish(&self, handle: &ChannelHandle, update: TrackingUpdate) -> usize {
        match handle.tx.send(update) {
            Ok(receivers) => {
                tracing::debug!("published on {} to {} subscriber(s)", handle.name(), receivers);
                receivers
            }
            Err(_) => {
                tracing::debug!("published on {} with no subscribers", handle.name());
                0
            }
        }
    }

    /// Registers a listener on the handle's topic.
    ///
    /// The receiver is attached before this returns, so any update published
    /// afterwards reaches `on_message`. Updates arrive in publish order;
    /// `on_status` sees `connecting`, `subscribed`, then `disconnected` when
    /// the subscription ends. A subscriber that falls behind the buffer gets an
    /// `error` status for the skipped updates and keeps going.
    ///
    pub fn subscribe<M, S>(&self, handle: &ChannelHandle, mut on_message: M, mut on_status: S) -> Subscription
    where
        M: FnMut(TrackingUpdate) + Send + 'static,
        S: FnMut(ConnectionStatus) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let booking_id = handle.booking_id;
        on_status(ConnectionStatus::Connecting);
        let mut rx = handle.tx.subscribe();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (tx, registry) = (handle.tx.clone(), handle.registry.clone());

        let task = tokio::spawn(async move {
            on_status(ConnectionStatus::Subscribed);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    msg = rx.recv() => match msg {
                        Ok(update) => on_message(update),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("subscriber {} on booking {} missed {} update(s)", id, booking_id, missed);
                            on_status(ConnectionStatus::Error(format!("missed {missed} update(s)")));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            drop(rx);
            prune(&mut lock(&registry), booking_id, &tx);
            on_status(ConnectionStatus::Disconnected);
        });

        Subscription {
            id,
            booking_id,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn update(booking_id: Uuid, lat: f64) -> TrackingUpdate {
        TrackingUpdate {
            booking_id,
            latitude: Some(lat),
            longitude: Some(28.04),
            status: BookingStatus::InProgress,
            timestamp: Utc::now(),
        }
    }

    fn collect(
        hub: &TrackingHub,
        handle: &ChannelHandle,
    ) -> (
        Subscription,
        mpsc::UnboundedReceiver<TrackingUpdate>,
        mpsc::UnboundedReceiver<ConnectionStatus>,
    ) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let sub = hub.subscribe(
            handle,
            move |u| {
                let _ = msg_tx.send(u);
            },
            move |s| {
                let _ = status_tx.send(s);
            },
        );
        (sub, msg_rx, status_rx)
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn open_channel_is_idempotent() {
        let hub = TrackingHub::default();
        let booking_id = Uuid::new_v4();

        let a = hub.open_channel(booking_id);
        let b = hub.open_channel(booking_id);
        assert_eq!(hub.open_channels(), 1);

        let (_sub, mut rx, _status) = collect(&hub, &a);
        assert_eq!(hub.publish(&b, update(booking_id, 1.0)), 1);
        assert_eq!(next(&mut rx).await.latitude, Some(1.0));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let hub = TrackingHub::default();
        let handle = hub.open_channel(Uuid::new_v4());
        assert_eq!(hub.publish(&handle, update(handle.booking_id, 1.0)), 0);
    }

    #[tokio::test]
    async fn every_subscriber_gets_updates_in_order() {
        let hub = TrackingHub::default();
        let handle = hub.open_channel(Uuid::new_v4());
        let (_s1, mut rx1, _) = collect(&hub, &handle);
        let (_s2, mut rx2, _) = collect(&hub, &handle);

        for lat in [1.0, 2.0, 3.0] {
            hub.publish(&handle, update(handle.booking_id, lat));
        }

        for rx in [&mut rx1, &mut rx2] {
            for lat in [1.0, 2.0, 3.0] {
                assert_eq!(next(rx).await.latitude, Some(lat));
            }
        }
    }

    #[tokio::test]
    async fn status_lifecycle_is_reported() {
        let hub = TrackingHub::default();
        let handle = hub.open_channel(Uuid::new_v4());
        let (sub, _rx, mut status) = collect(&hub, &handle);

        assert_eq!(next(&mut status).await, ConnectionStatus::Connecting);
        assert_eq!(next(&mut status).await, ConnectionStatus::Subscribed);

        sub.unsubscribe().await;
        assert_eq!(next(&mut status).await, ConnectionStatus::Disconnected);
        assert_eq!(handle.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let hub = TrackingHub::default();
        let handle = hub.open_channel(Uuid::new_v4());
        hub.publish(&handle, update(handle.booking_id, 1.0));

        let (_sub, mut rx, _) = collect(&hub, &handle);
        hub.publish(&handle, update(handle.booking_id, 2.0));
        assert_eq!(next(&mut rx).await.latitude, Some(2.0));
    }

    #[tokio::test]
    async fn dropping_a_subscription_releases_it() {
        let hub = TrackingHub::default();
        let handle = hub.open_channel(Uuid::new_v4());
        let (sub, _rx, mut status) = collect(&hub, &handle);
        let (_other, mut other_rx, _) = collect(&hub, &handle);

        drop(sub);
        next(&mut status).await;
        next(&mut status).await;
        assert_eq!(next(&mut status).await, ConnectionStatus::Disconnected);

        // the remaining subscriber is unaffected
        hub.publish(&handle, update(handle.booking_id, 5.0));
        assert_eq!(next(&mut other_rx).await.latitude, Some(5.0));
        assert_eq!(handle.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn close_channel_keeps_topics_with_listeners() {
        let hub = TrackingHub::default();
        let booking_id = Uuid::new_v4();
        let handle = hub.open_channel(booking_id);
        let (sub, mut rx, _) = collect(&hub, &handle);

        hub.close_channel(hub.open_channel(booking_id));
        assert_eq!(hub.open_channels(), 1);
        hub.publish(&handle, update(booking_id, 7.0));
        assert_eq!(next(&mut rx).await.latitude, Some(7.0));

        sub.unsubscribe().await;
        hub.close_channel(handle);
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn closing_one_handle_leaves_other_holders_on_the_topic() {
        let hub = TrackingHub::default();
        let booking_id = Uuid::new_v4();
        let viewer = hub.open_channel(booking_id);

        // a producer opens, publishes to nobody, and closes
        let producer = hub.open_channel(booking_id);
        assert_eq!(hub.publish(&producer, update(booking_id, 1.0)), 0);
        hub.close_channel(producer);
        assert_eq!(hub.open_channels(), 1);

        let (_sub, mut rx, _) = collect(&hub, &viewer);
        let next_producer = hub.open_channel(booking_id);
        assert_eq!(hub.publish(&next_producer, update(booking_id, 2.0)), 1);
        assert_eq!(next(&mut rx).await.latitude, Some(2.0));
    }

    #[tokio::test]
    async fn topic_goes_away_after_last_handle_and_listener() {
        let hub = TrackingHub::default();
        let booking_id = Uuid::new_v4();
        let handle = hub.open_channel(booking_id);
        let (sub, _rx, _) = collect(&hub, &handle);

        // the listener alone keeps the topic alive
        hub.close_channel(handle);
        assert_eq!(hub.open_channels(), 1);

        sub.unsubscribe().await;
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_and_continues() {
        let hub = TrackingHub::new(2);
        let handle = hub.open_channel(Uuid::new_v4());

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        // publish before the listener task gets to run
        let _sub = hub.subscribe(
            &handle,
            move |u| {
                let _ = msg_tx.send(u);
            },
            move |s| {
                let _ = status_tx.send(s);
            },
        );
        for lat in [1.0, 2.0, 3.0, 4.0, 5.0] {
            hub.publish(&handle, update(handle.booking_id, lat));
        }

        assert_eq!(next(&mut status_rx).await, ConnectionStatus::Connecting);
        assert_eq!(next(&mut status_rx).await, ConnectionStatus::Subscribed);
        assert!(matches!(next(&mut status_rx).await, ConnectionStatus::Error(_)));
        assert_eq!(next(&mut msg_rx).await.latitude, Some(4.0));
        assert_eq!(next(&mut msg_rx).await.latitude, Some(5.0));
    }
}
