use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a registration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowChange {
    Inserted,
    Updated,
}

/// Events sent over the WebSocket gateway.
///
/// These are invalidation signals: they say which row changed, never the new
/// contents. Clients re-fetch the event detail or roster on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A row in `event_registrations` was written
    RegistrationChanged {
        event_id: Uuid,
        registration_id: Uuid,
        user_id: Uuid,
        change: RowChange,
    },

    /// An attendance verification was written
    AttendanceChanged {
        event_id: Uuid,
        user_id: Uuid,
        verified: bool,
    },
}

impl GatewayEvent {
    /// Returns the event id this gateway event is scoped to.
    /// `None` means the event is addressed to the connection itself.
    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            Self::RegistrationChanged { event_id, .. } => Some(*event_id),
            Self::AttendanceChanged { event_id, .. } => Some(*event_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of events this connection receives changes for.
    Subscribe { event_ids: Vec<Uuid> },
}
