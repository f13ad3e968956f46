use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use clubhouse_db::Database;
use clubhouse_gateway::Dispatcher;

use crate::codes::CodeSigner;
use crate::error::ApiError;
use crate::notify::Notifier;
use crate::payments::RefundGateway;
use crate::snapshot::SnapshotCache;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub notifier: Notifier,
    pub refunds: Arc<dyn RefundGateway>,
    pub codes: CodeSigner,
    pub snapshots: SnapshotCache,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        jwt_secret: String,
        dispatcher: Dispatcher,
        notifier: Notifier,
        refunds: Arc<dyn RefundGateway>,
        codes: CodeSigner,
    ) -> Self {
        let snapshots = SnapshotCache::new(dispatcher.subscribe());
        Self {
            db,
            jwt_secret,
            dispatcher,
            notifier,
            refunds,
            codes,
            snapshots,
        }
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed: {}", e))
        })?
}
