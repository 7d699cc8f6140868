use anyhow::Context as _;
use chrono::Utc;
use sea_orm::sea_query::{
    Alias, Expr, InsertStatement, Order, Query, SelectStatement, UpdateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, SqlErr};

use delay_domain::id::MessageId;
use delay_domain::message::{DelayMessage, DelayStatus};
use delay_domain::shard::ShardId;
use delay_schema::delay_messages::{self, Column};

use crate::domain::repository::DelayStore;
use crate::error::DelayError;

const ALL_COLUMNS: [Column; 8] = [
    Column::Id,
    Column::Topic,
    Column::Value,
    Column::DedupKey,
    Column::Deadline,
    Column::Status,
    Column::CreatedAt,
    Column::UpdatedAt,
];

// ── Statements ────────────────────────────────────────────────────────────────

fn table_ref(shard: ShardId) -> (Alias, Alias) {
    (Alias::new(shard.schema_name()), Alias::new(shard.table_name()))
}

pub fn insert_statement(
    shard: ShardId,
    msg: &DelayMessage,
) -> Result<InsertStatement, sea_orm::sea_query::error::Error> {
    let mut stmt = Query::insert();
    stmt.into_table(table_ref(shard)).columns(ALL_COLUMNS);
    stmt.values([
        msg.id.0.into(),
        msg.topic.clone().into(),
        msg.value.to_vec().into(),
        msg.dedup_key.clone().into(),
        msg.deadline.into(),
        msg.status.as_i16().into(),
        msg.created_at.into(),
        msg.updated_at.into(),
    ])?;
    Ok(stmt)
}

/// Waiting rows due at `now_ms`, oldest submission first.
pub fn find_due_statement(shard: ShardId, now_ms: i64, limit: u64) -> SelectStatement {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(table_ref(shard))
        .and_where(Expr::col(Column::Status).eq(DelayStatus::Waiting.as_i16()))
        .and_where(Expr::col(Column::Deadline).lte(now_ms))
        .order_by(Column::CreatedAt, Order::Asc)
        .order_by(Column::Id, Order::Asc)
        .limit(limit)
        .to_owned()
}

/// Only waiting rows are touched; completed rows stay as they are.
pub fn mark_complete_statement(shard: ShardId, ids: &[MessageId], now_ms: i64) -> UpdateStatement {
    Query::update()
        .table(table_ref(shard))
        .values([
            (Column::Status, DelayStatus::Completed.as_i16().into()),
            (Column::UpdatedAt, now_ms.into()),
        ])
        .and_where(Expr::col(Column::Id).is_in(ids.iter().map(|id| id.0)))
        .and_where(Expr::col(Column::Status).eq(DelayStatus::Waiting.as_i16()))
        .to_owned()
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbDelayStore {
    pub db: DatabaseConnection,
}

impl DelayStore for DbDelayStore {
    async fn insert(&self, shard: ShardId, msg: &DelayMessage) -> Result<(), DelayError> {
        let stmt = insert_statement(shard, msg).context("build delay message insert")?;
        let backend = self.db.get_database_backend();
        match self.db.execute(backend.build(&stmt)).await {
            Ok(_) => Ok(()),
            Err(e) => match (&msg.dedup_key, dedup_key_violation(&e)) {
                (Some(key), true) => Err(DelayError::DuplicateKey(key.clone())),
                // An id collision is not a duplicate request: leave it for redelivery.
                _ => Err(anyhow::Error::new(e)
                    .context(format!("insert delay message {} into {shard}", msg.id))
                    .into()),
            },
        }
    }

    async fn find_due(&self, shard: ShardId, limit: u64) -> Result<Vec<DelayMessage>, DelayError> {
        let stmt = find_due_statement(shard, Utc::now().timestamp_millis(), limit);
        let backend = self.db.get_database_backend();
        let rows = delay_messages::Model::find_by_statement(backend.build(&stmt))
            .all(&self.db)
            .await
            .with_context(|| format!("find due delay messages in {shard}"))?;
        rows.into_iter().map(message_from_model).collect()
    }

    async fn mark_complete(&self, shard: ShardId, ids: &[MessageId]) -> Result<(), DelayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let stmt = mark_complete_statement(shard, ids, Utc::now().timestamp_millis());
        let backend = self.db.get_database_backend();
        self.db
            .execute(backend.build(&stmt))
            .await
            .with_context(|| format!("mark delay messages complete in {shard}"))?;
        Ok(())
    }
}

/// Suffix of the partial unique index on waiting dedup keys.
const DEDUP_KEY_INDEX_SUFFIX: &str = "_waiting_dedup_key";

/// Whether `err` violates the waiting dedup-key index (and not, say, the primary key).
fn dedup_key_violation(err: &DbErr) -> bool {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => names_dedup_key_index(&detail),
        _ => false,
    }
}

fn names_dedup_key_index(detail: &str) -> bool {
    detail.contains(DEDUP_KEY_INDEX_SUFFIX)
}

fn message_from_model(m: delay_messages::Model) -> Result<DelayMessage, DelayError> {
    let status = DelayStatus::try_from(m.status).context("decode delay message status")?;
    Ok(DelayMessage {
        id: MessageId(m.id),
        topic: m.topic,
        value: m.value.into(),
        dedup_key: m.dedup_key,
        deadline: m.deadline,
        status,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}
