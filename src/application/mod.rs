//! Application services: the item workflow and the ports it depends on.

pub mod error;
pub mod items;
pub mod like_locks;
pub mod notify;
pub mod repos;
