//! Secret entity model
//!
//! Encrypted Canvas access token for a connection, 1:1, stored apart from
//! connection metadata so credential bytes never ride along with listings.
//! Rows leave this table only via the secret codec boundary.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use super::connection::Entity as Connection;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, serde::Serialize, serde::Deserialize)]
#[sea_orm(table_name = "lms_secrets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Connection this secret belongs to (unique).
    pub connection_id: Uuid,

    /// AES-256-GCM ciphertext with trailing auth tag.
    pub ciphertext: Vec<u8>,

    /// Nonce the token was sealed with.
    pub iv: Vec<u8>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Connection",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id"
    )]
    Connection,
}

impl Related<Connection> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
