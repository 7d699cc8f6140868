//! Static two-level shard layout: an outer database axis and an inner table axis.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One physical shard, addressed as `delay_db_{db}.delay_tab_{table}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId {
    pub db: u32,
    pub table: u32,
}

impl ShardId {
    pub fn new(db: u32, table: u32) -> Self {
        Self { db, table }
    }

    /// Schema (database) part of the physical name.
    pub fn schema_name(&self) -> String {
        format!("delay_db_{}", self.db)
    }

    /// Table part of the physical name.
    pub fn table_name(&self) -> String {
        format!("delay_tab_{}", self.table)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name(), self.table_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardLayoutError {
    #[error("shard layout needs at least one database and one table (got {db_count}x{table_count})")]
    Empty { db_count: u32, table_count: u32 },
    #[error("shard index {index} out of range for {total} shards")]
    OutOfRange { index: usize, total: usize },
}

/// Fixed shard count known at startup; live resharding is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLayout {
    db_count: u32,
    table_count: u32,
}

impl ShardLayout {
    pub fn new(db_count: u32, table_count: u32) -> Result<Self, ShardLayoutError> {
        if db_count == 0 || table_count == 0 {
            return Err(ShardLayoutError::Empty {
                db_count,
                table_count,
            });
        }
        Ok(Self {
            db_count,
            table_count,
        })
    }

    pub fn db_count(&self) -> u32 {
        self.db_count
    }

    pub fn table_count(&self) -> u32 {
        self.table_count
    }

    /// Total number of shards.
    pub fn total(&self) -> usize {
        self.db_count as usize * self.table_count as usize
    }

    /// Map a flat index to its shard: `db = index / table_count`, `table = index % table_count`.
    pub fn shard_at(&self, index: usize) -> Result<ShardId, ShardLayoutError> {
        let total = self.total();
        if index >= total {
            return Err(ShardLayoutError::OutOfRange { index, total });
        }
        let table_count = self.table_count as usize;
        Ok(ShardId::new(
            (index / table_count) as u32,
            (index % table_count) as u32,
        ))
    }

    /// Flat index of a shard. `None` if the shard is outside this layout.
    pub fn index_of(&self, shard: ShardId) -> Option<usize> {
        if !self.contains(shard) {
            return None;
        }
        Some(shard.db as usize * self.table_count as usize + shard.table as usize)
    }

    pub fn contains(&self, shard: ShardId) -> bool {
        shard.db < self.db_count && shard.table < self.table_count
    }

    /// Every shard exactly once, in flat-index order.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + '_ {
        (0..self.db_count).flat_map(move |db| (0..self.table_count).map(move |t| ShardId::new(db, t)))
    }
}
