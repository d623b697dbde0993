//! `BoardSync` — real-time sync engine for a shared task board and
//! message feed.

pub mod board;
pub mod channel;
pub mod client;
pub mod config;
pub mod feed;
pub mod gateway;
pub mod reconcile;
pub mod store;
