use delay_domain::shard::{ShardId, ShardLayout};
use sea_orm_migration::prelude::*;

const DEFAULT_DB_COUNT: u32 = 2;
const DEFAULT_TABLE_COUNT: u32 = 2;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Shard layout to migrate, from `DELAY_SHARD_DB_COUNT` and
/// `DELAY_SHARD_TABLE_COUNT` (both default to 2). Must match the layout the
/// service is started with.
pub fn shard_layout_from_env() -> Result<ShardLayout, DbErr> {
    layout_from_vars(
        std::env::var("DELAY_SHARD_DB_COUNT").ok(),
        std::env::var("DELAY_SHARD_TABLE_COUNT").ok(),
    )
}

fn layout_from_vars(db: Option<String>, table: Option<String>) -> Result<ShardLayout, DbErr> {
    let parse = |name: &str, raw: Option<String>, default: u32| -> Result<u32, DbErr> {
        match raw {
            Some(v) => v
                .parse()
                .map_err(|_| DbErr::Custom(format!("{name} must be a positive integer, got {v:?}"))),
            None => Ok(default),
        }
    };
    let db_count = parse("DELAY_SHARD_DB_COUNT", db, DEFAULT_DB_COUNT)?;
    let table_count = parse("DELAY_SHARD_TABLE_COUNT", table, DEFAULT_TABLE_COUNT)?;
    ShardLayout::new(db_count, table_count).map_err(|e| DbErr::Custom(e.to_string()))
}

fn table_ref(shard: ShardId) -> (Alias, Alias) {
    (Alias::new(shard.schema_name()), Alias::new(shard.table_name()))
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let layout = shard_layout_from_env()?;
        let conn = manager.get_connection();

        for db in 0..layout.db_count() {
            conn.execute_unprepared(&format!(
                r#"CREATE SCHEMA IF NOT EXISTS "{}""#,
                ShardId::new(db, 0).schema_name()
            ))
            .await?;
        }

        for shard in layout.shards() {
            let table = shard.table_name();

            manager
                .create_table(
                    Table::create()
                        .table(table_ref(shard))
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DelayMessages::Id)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(DelayMessages::Topic).string_len(512).not_null())
                        .col(ColumnDef::new(DelayMessages::Value).blob().not_null())
                        .col(ColumnDef::new(DelayMessages::DedupKey).string_len(512))
                        .col(ColumnDef::new(DelayMessages::Deadline).big_integer().not_null())
                        .col(
                            ColumnDef::new(DelayMessages::Status)
                                .small_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(DelayMessages::CreatedAt).big_integer().not_null())
                        .col(ColumnDef::new(DelayMessages::UpdatedAt).big_integer().not_null())
                        .to_owned(),
                )
                .await?;

            // Due-scan: status = 0 AND deadline <= now.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .table(table_ref(shard))
                        .col(DelayMessages::Status)
                        .col(DelayMessages::Deadline)
                        .name(format!("idx_{table}_status_deadline"))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .table(table_ref(shard))
                        .col(DelayMessages::UpdatedAt)
                        .name(format!("idx_{table}_updated_at"))
                        .to_owned(),
                )
                .await?;

            // Dedup keys are unique among waiting rows only; completed keys may be reused.
            conn.execute_unprepared(&format!(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "uq_{table}_waiting_dedup_key"
                   ON "{schema}"."{table}" (dedup_key) WHERE status = 0"#,
                schema = shard.schema_name(),
            ))
            .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let layout = shard_layout_from_env()?;
        for shard in layout.shards() {
            manager
                .drop_table(Table::drop().table(table_ref(shard)).if_exists().to_owned())
                .await?;
        }
        let conn = manager.get_connection();
        for db in 0..layout.db_count() {
            conn.execute_unprepared(&format!(
                r#"DROP SCHEMA IF EXISTS "{}""#,
                ShardId::new(db, 0).schema_name()
            ))
            .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum DelayMessages {
    Id,
    Topic,
    Value,
    DedupKey,
    Deadline,
    Status,
    CreatedAt,
    UpdatedAt,
}
