//! Domain types shared across the delay platform.
//!
//! This crate contains only pure types with no framework dependencies.
//! Storage, transport and scheduling live in `services/delay`.

pub mod id;
pub mod message;
pub mod shard;
