use delay_domain::id::MessageId;
use delay_domain::message::DelayMessage;
use delay_domain::shard::{ShardId, ShardLayout};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64 bit. Stable across processes and releases.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Static message-to-shard routing.
///
/// Keyed messages route by the hash of their dedup key, so every submission
/// of one key lands on the same shard and the per-shard unique index is
/// enough to deduplicate. Unkeyed messages route by id.
#[derive(Debug, Clone, Copy)]
pub struct ShardRouter {
    layout: ShardLayout,
}

impl ShardRouter {
    pub fn new(layout: ShardLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ShardLayout {
        self.layout
    }

    pub fn route_key(id: MessageId, dedup_key: Option<&str>) -> u64 {
        match dedup_key {
            Some(key) => fnv1a(key.as_bytes()),
            None => id.0 as u64,
        }
    }

    pub fn shard_for_key(&self, key: u64) -> ShardId {
        let index = key % self.layout.total() as u64;
        let table_count = u64::from(self.layout.table_count());
        ShardId::new((index / table_count) as u32, (index % table_count) as u32)
    }

    pub fn shard_for(&self, msg: &DelayMessage) -> ShardId {
        self.shard_for_key(Self::route_key(msg.id, msg.dedup_key.as_deref()))
    }
}
