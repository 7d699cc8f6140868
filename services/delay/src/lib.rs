pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod infra;
pub mod router;
pub mod usecase;
