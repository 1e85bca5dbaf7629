//! Shared list server: cache-aside list reads, race-free likes, and live fan-out of the
//! list to WebSocket observers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod hub;
pub mod infra;
