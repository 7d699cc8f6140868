//! Shared service plumbing for the delay platform: configuration loading,
//! tracing setup, health handlers and serde helpers.

pub mod config;
pub mod health;
pub mod serde;
pub mod tracing;
