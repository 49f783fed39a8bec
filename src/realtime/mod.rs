use std::convert::Infallible;

use axum::response::sse;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::entities::{driver_location, ride};

/// A row-change notification fanned out to subscribed clients.
///
/// Delivery is best-effort, at-least-once: a receiver that falls behind
/// skips ahead to fresh events rather than stalling the publisher. Only
/// the latest value matters for every event kind carried here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new ride entered `searching` (drivers watch this feed).
    RideRequested { ride: ride::Model },
    /// A ride row changed (status, assignment, timestamps).
    RideUpdated { ride: ride::Model },
    /// A driver published a fresh position.
    DriverLocation { location: driver_location::Model },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RideRequested { .. } => "ride_requested",
            Event::RideUpdated { .. } => "ride_updated",
            Event::DriverLocation { .. } => "driver_location",
        }
    }
}

/// In-process change feed. Subscribers hold a broadcast receiver that is
/// released when their stream is dropped, so a closed SSE connection
/// cleans itself up.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Having no subscribers is not
    /// an error; the event is simply dropped.
    pub fn publish(&self, event: Event) {
        if let Err(err) = self.tx.send(event) {
            tracing::trace!(event = %err.0.name(), "no subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        // Enough backlog that a briefly-slow SSE client only loses
        // intermediate positions, never the stream itself
        Self::new(256)
    }
}

/// Encode a payload as a named SSE event, skipping values that fail to
/// serialize rather than killing the stream.
pub fn sse_event<T: Serialize>(name: &str, data: &T) -> Option<Result<sse::Event, Infallible>> {
    sse::Event::default().event(name).json_data(data).ok().map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn location(driver_id: Uuid, lat: f64) -> driver_location::Model {
        driver_location::Model {
            driver_id,
            latitude: lat,
            longitude: -61.2225,
            heading: None,
            speed: None,
            accuracy: None,
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates_in_order() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        let driver = Uuid::new_v4();

        hub.publish(Event::DriverLocation { location: location(driver, 10.1) });
        hub.publish(Event::DriverLocation { location: location(driver, 10.2) });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        match (first, second) {
            (
                Event::DriverLocation { location: a },
                Event::DriverLocation { location: b },
            ) => {
                assert_eq!(a.latitude, 10.1);
                assert_eq!(b.latitude, 10.2);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_to_fresh_events() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        let driver = Uuid::new_v4();

        // Overflow the channel; the oldest events are discarded
        for i in 0..5 {
            hub.publish(Event::DriverLocation { location: location(driver, 10.0 + i as f64) });
        }

        // First recv reports the lag, the next delivers a fresh event
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        let event = rx.recv().await.unwrap();
        match event {
            Event::DriverLocation { location } => assert!(location.latitude >= 13.0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropping_receiver_releases_subscription() {
        let hub = EventHub::new(8);
        let rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let hub = EventHub::new(8);
        hub.publish(Event::DriverLocation { location: location(Uuid::new_v4(), 10.0) });
    }
}
