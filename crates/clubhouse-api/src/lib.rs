pub mod auth;
pub mod codes;
pub mod convert;
pub mod error;
pub mod events;
pub mod guests;
pub mod middleware;
pub mod notify;
pub mod payments;
pub mod registrations;
pub mod roster;
pub mod snapshot;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
