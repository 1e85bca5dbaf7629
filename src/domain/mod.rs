//! Domain layer: item records and the rules an item must satisfy.

pub mod entities;
pub mod error;
pub mod items;
