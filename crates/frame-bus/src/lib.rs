//! Origin-tagged message channel between an editor window and the framed
//! surface it renders.
//!
//! Messages are one-way and fire-and-forget. Every message records the origin
//! its sender declared, so a listener that accepts traffic from anyone on its
//! topic can still decide whom to believe.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub origin: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    /// Nobody is listening on the topic; the message was dropped.
    #[error("no listener on topic {0}")]
    Closed(String),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    fn publish(&self, topic: &str, origin: &str, payload: Bytes) -> BusResult<()>;
}

/// In-memory bus shared by both sides of a frame when they live in one process.
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Number of live receivers on `topic`. Zero means a publish would be dropped.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, origin: &str, payload: Bytes) -> BusResult<()> {
        let closed = || BusError::Closed(topic.to_string());
        let topics = self.topics.read();
        let sender = topics.get(topic).ok_or_else(closed)?;
        let msg = BusMessage {
            topic: topic.to_string(),
            origin: origin.to_string(),
            payload,
        };
        sender.send(msg).map_err(|_| closed())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_bus_carries_sender_origin() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("host.window");
        bus.publish(
            "host.window",
            "http://localhost:5173",
            Bytes::from_static(b"{\"type\":\"HANDSHAKE_ACK\"}"),
        )
        .expect("publish ok");
        let msg = sub.recv().await.expect("receive ok");
        assert_eq!(msg.topic, "host.window");
        assert_eq!(msg.origin, "http://localhost:5173");
        assert_eq!(msg.payload, Bytes::from_static(b"{\"type\":\"HANDSHAKE_ACK\"}"));
    }

    #[test]
    fn publish_without_listeners_reports_closed() {
        let bus = LocalBus::new();
        assert_eq!(bus.listener_count("surface.window"), 0);
        let err = bus
            .publish("surface.window", "null", Bytes::from_static(b"{}"))
            .unwrap_err();
        assert!(matches!(err, BusError::Closed(topic) if topic == "surface.window"));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::new();
        let mut host = bus.subscribe("host.window");
        let _surface = bus.subscribe("surface.window");
        assert_eq!(bus.listener_count("surface.window"), 1);
        bus.publish("surface.window", "a", Bytes::from_static(b"one"))
            .expect("publish ok");
        bus.publish("host.window", "b", Bytes::from_static(b"two"))
            .expect("publish ok");
        let msg = host.recv().await.expect("receive ok");
        assert_eq!(msg.payload, Bytes::from_static(b"two"));
    }
}
