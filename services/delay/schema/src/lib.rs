//! `sea-orm` entities for the delay platform.
//!
//! Every shard is a physical table with the same shape; the entity's
//! `table_name` is only the logical name; queries target a concrete
//! `delay_db_{i}.delay_tab_{j}` table at runtime.

pub mod delay_messages;
