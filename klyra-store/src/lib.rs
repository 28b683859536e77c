//! Klyra board store.
//!
//! Holds projects, columns, cards and the activity log in memory and serves
//! them over a WebSocket using the `klyra-proto` store protocol. Used by the
//! `klyra-store` binary and embedded by integration tests.

pub mod config;
pub mod seed;
pub mod server;
pub mod store;
