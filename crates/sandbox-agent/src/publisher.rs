use std::sync::Arc;

use bytes::Bytes;
use frame_bus::Bus;
use inspector_proto::{Event, TOPIC_HOST_WINDOW};

use crate::AgentResult;

/// Posts agent events into the host window under the surface's origin.
pub struct SurfaceBusPublisher<B: Bus> {
    bus: Arc<B>,
    origin: String,
}

impl<B: Bus> SurfaceBusPublisher<B> {
    pub fn new(bus: Arc<B>, origin: impl Into<String>) -> Self {
        Self {
            bus,
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn publish(&self, event: &Event) -> AgentResult<()> {
        let payload = event.encode()?;
        self.bus
            .publish(TOPIC_HOST_WINDOW, &self.origin, Bytes::from(payload))?;
        Ok(())
    }
}

impl<B: Bus> Clone for SurfaceBusPublisher<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            origin: self.origin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_bus::LocalBus;
    use inspector_proto::SelectorPayload;

    #[tokio::test]
    async fn publishes_enveloped_events_with_origin() {
        let bus = Arc::new(LocalBus::new());
        let publisher = SurfaceBusPublisher::new(bus.clone(), "http://localhost:5173");
        let mut rx = bus.subscribe(TOPIC_HOST_WINDOW);

        publisher
            .publish(&Event::Selected(SelectorPayload {
                selector: "#box".into(),
            }))
            .expect("publish ok");
        let msg = rx.recv().await.expect("msg");
        assert_eq!(msg.origin, "http://localhost:5173");
        let value: serde_json::Value = serde_json::from_slice(&msg.payload).expect("valid json envelope");
        assert_eq!(value["type"], "SELECTED");
        assert_eq!(value["payload"]["selector"], "#box");
    }

    #[test]
    fn reports_closed_host_window() {
        let bus = Arc::new(LocalBus::new());
        let publisher = SurfaceBusPublisher::new(bus, "null");
        let err = publisher.publish(&Event::HandshakeAck).unwrap_err();
        assert!(matches!(err, crate::AgentError::Bus(frame_bus::BusError::Closed(_))));
    }
}
