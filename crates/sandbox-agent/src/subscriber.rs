use std::sync::Arc;

use frame_bus::Bus;
use inspector_proto::TOPIC_SURFACE_WINDOW;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::agent::SandboxAgent;

#[derive(Clone)]
pub struct SurfaceBusSubscriber<B: Bus> {
    bus: Arc<B>,
}

impl<B: Bus + 'static> SurfaceBusSubscriber<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Feeds every message posted into the surface window to `agent`.
    /// Commands are trusted: the surface has no identity to check them against.
    pub fn spawn_agent_worker(&self, agent: Arc<SandboxAgent<B>>) -> tokio::task::JoinHandle<()> {
        let mut rx = self.bus.subscribe(TOPIC_SURFACE_WINDOW);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        debug!(
                            target = "agent.bus",
                            origin = %msg.origin,
                            bytes = msg.payload.len(),
                            "surface window message"
                        );
                        let _ = agent.handle_message(&msg.payload);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target = "agent.bus", skipped, "agent worker lagged behind surface window");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::animation::{LibraryGate, TweenRegistry};
    use crate::dom::Document;
    use bytes::Bytes;
    use frame_bus::LocalBus;
    use inspector_proto::{Command, Event, TOPIC_HOST_WINDOW};
    use kurbo::Size;
    use tokio::time::Duration;

    #[tokio::test]
    async fn worker_answers_pings_and_skips_garbage() {
        let bus = Arc::new(LocalBus::new());
        let agent = SandboxAgent::new(
            bus.clone(),
            Document::new(Size::new(100.0, 100.0)),
            LibraryGate::with_engine(Arc::new(TweenRegistry::new())),
            AgentConfig::default(),
        );
        let mut host_rx = bus.subscribe(TOPIC_HOST_WINDOW);
        let _task = SurfaceBusSubscriber::new(bus.clone()).spawn_agent_worker(agent);

        bus.publish(TOPIC_SURFACE_WINDOW, "http://localhost:5173", Bytes::from_static(b"{oops"))
            .expect("publish garbage");
        bus.publish(
            TOPIC_SURFACE_WINDOW,
            "http://localhost:5173",
            Bytes::from(Command::HandshakePing.encode().expect("encode")),
        )
        .expect("publish ping");

        let msg = tokio::time::timeout(Duration::from_secs(2), host_rx.recv())
            .await
            .expect("ack timeout")
            .expect("ack message");
        assert_eq!(msg.origin, "http://localhost:5173");
        assert_eq!(Event::decode(&msg.payload).expect("event"), Event::HandshakeAck);
    }
}
