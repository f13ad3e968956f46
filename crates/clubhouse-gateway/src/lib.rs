//! Clubhouse realtime change feed.
//!
//! Writers call `Dispatcher::broadcast` after every registration or
//! attendance write; WebSocket connections forward the events for the event
//! ids they subscribed to. Receivers treat every event as "re-fetch now".

pub mod connection;
pub mod dispatcher;

pub use dispatcher::Dispatcher;
