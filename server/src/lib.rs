//! foodswift — order/user API with a realtime delivery-tracking and
//! chat relay.
//!
//! HTTP routes live in [`routes`]; the realtime relay is [`ws`] →
//! [`relay`] over [`sessions`] and [`rooms`]. All persistence goes
//! through the injected [`store::DocumentStore`].

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
