use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use clubhouse_types::api::EventSummary;
use clubhouse_types::events::GatewayEvent;

/// Event summaries (event + counts) cached per event id.
///
/// The cache holds its own change-feed receiver and drains it before every
/// read, dropping entries for events that changed. Nothing is patched in
/// place: an invalidated entry is re-loaded from the store on the next read.
pub struct SnapshotCache {
    inner: Mutex<Inner>,
}

struct Inner {
    feed: broadcast::Receiver<GatewayEvent>,
    entries: HashMap<Uuid, EventSummary>,
}

impl Inner {
    fn drain_feed(&mut self) {
        loop {
            match self.feed.try_recv() {
                Ok(event) => {
                    if let Some(event_id) = event.event_id() {
                        if self.entries.remove(&event_id).is_some() {
                            debug!("Snapshot for event {} invalidated", event_id);
                        }
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Snapshot feed lagged by {} events, dropping all snapshots", n);
                    self.entries.clear();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

impl SnapshotCache {
    pub fn new(feed: broadcast::Receiver<GatewayEvent>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                feed,
                entries: HashMap::new(),
            }),
        }
    }

    /// Cached summary for `event_id`, loading it with `load` on a miss.
    ///
    /// The lock is held across `load`, so a change published while loading
    /// is seen by the next drain and evicts the fresh entry again.
    pub fn get_or_load<F, E>(&self, event_id: Uuid, load: F) -> Result<EventSummary, E>
    where
        F: FnOnce() -> Result<EventSummary, E>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.drain_feed();

        if let Some(summary) = inner.entries.get(&event_id) {
            return Ok(summary.clone());
        }

        let summary = load()?;
        inner.entries.insert(event_id, summary.clone());
        Ok(summary)
    }

    /// Drop a snapshot for a change that does not travel over the feed
    /// (event edits).
    pub fn invalidate(&self, event_id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(&event_id);
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.drain_feed();
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
