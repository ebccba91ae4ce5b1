use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::domain::prelude::*;
use crate::stream::tracking::TrackingHub;

/// Beats kept for a websocket writer that falls behind; older ones are
/// skipped rather than queued.
const BACKLOG: usize = 16;

/// Starts the beat loop behind `AppState` and returns its sender.
///
/// Each beat samples the tracking hub, so an idle tracking page still hears
/// from the server and can show how many bookings are being followed. The
/// loop stops once every receiver and the returned sender are gone.
///
pub fn channel(every: Duration, hub: TrackingHub) -> broadcast::Sender<Heartbeat> {
    let (tx, _) = broadcast::channel(BACKLOG);
    let beats = tx.downgrade();

    tokio::spawn(async move {
        let mut stream = pulse(every, hub);
        while let Some(beat) = stream.next().await {
            let Some(tx) = beats.upgrade() else { break };
            let _ = tx.send(beat);
        }
        tracing::debug!("heartbeat stopped");
    });
    tx
}

fn pulse(every: Duration, hub: TrackingHub) -> impl Stream<Item = Heartbeat> + Send + Unpin {
    Box::pin(futures::stream::unfold(hub, move |hub| async move {
        tokio::time::sleep(every).await;
        let beat = Heartbeat {
            status: "ok".to_string(),
            server_time: chrono::Utc::now(),
            open_channels: hub.open_channels(),
        };
        Some((beat, hub))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn beats_report_open_booking_channels() {
        let hub = TrackingHub::default();
        let tx = channel(Duration::from_secs(10), hub.clone());
        let mut rx = tx.subscribe();

        tokio::time::advance(Duration::from_secs(10)).await;
        let quiet = rx.recv().await.unwrap();
        assert_eq!(quiet.status, "ok");
        assert_eq!(quiet.open_channels, 0);

        let _handle = hub.open_channel(Uuid::new_v4());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(rx.recv().await.unwrap().open_channels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_the_sender_is_dropped() {
        let tx = channel(Duration::from_secs(1), TrackingHub::default());
        let mut rx = tx.subscribe();
        drop(tx);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
    }
}
