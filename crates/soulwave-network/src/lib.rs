//! Event publication for the UI and the HTTP gateway routes.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use soulwave_types::{events::SystemEvent, Result, SoulwaveError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

pub mod gateway;

#[async_trait]
pub trait RealtimeServer: Send + Sync {
    async fn run(&self) -> Result<()>;
    async fn publish(&self, event: SystemEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, SystemEvent>;
}

/// Simple in-process server backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalServer {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalServer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl RealtimeServer for LocalServer {
    async fn run(&self) -> Result<()> {
        info!("Starting local event bus");
        Ok(())
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn network_error(message: impl Into<String>) -> SoulwaveError {
    SoulwaveError::Network(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulwave_types::events::{EventKind, LifecyclePhase};

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let server = LocalServer::new(8);
        let mut stream = server.subscribe();
        server
            .publish(SystemEvent::lifecycle(LifecyclePhase::Boot, "up"))
            .await
            .unwrap();

        let event = stream.next().await.expect("event");
        assert_eq!(event.kind, EventKind::Lifecycle);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let server = LocalServer::new(1);
        assert!(server
            .publish(SystemEvent::lifecycle(LifecyclePhase::SessionEnd, "down"))
            .await
            .is_ok());
    }
}
