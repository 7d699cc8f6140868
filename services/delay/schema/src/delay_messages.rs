use sea_orm::entity::prelude::*;

/// One delay message row. Timestamps are epoch milliseconds.
/// `status`: 0 = waiting, 1 = completed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "delay_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub topic: String,
    pub value: Vec<u8>,
    pub dedup_key: Option<String>,
    pub deadline: i64,
    pub status: i16,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
