use sea_orm_migration::prelude::*;

mod m20260301_000001_create_delay_shards;

pub use m20260301_000001_create_delay_shards::shard_layout_from_env;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_create_delay_shards::Migration)]
    }
}
