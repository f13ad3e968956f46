use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use clubhouse_types::events::GatewayEvent;

/// Broadcast buffer; slower receivers than this lag and skip ahead.
const FEED_CAPACITY: usize = 1024;

/// Fans change notifications out to every subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        let delivered = self.inner.broadcast_tx.send(event).unwrap_or(0);
        trace!("gateway event delivered to {} receivers", delivered);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
