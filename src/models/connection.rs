//! Connection entity model
//!
//! One row per (owner, institution) linkage to a Canvas instance. The
//! encrypted access token lives in the secrets table, never here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::secret::Entity as Secret;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, serde::Serialize, serde::Deserialize)]
#[sea_orm(table_name = "lms_connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning principal; every query filters on this.
    pub owner_id: Uuid,

    /// Provider tag, fixed to "canvas".
    pub provider: String,

    /// Base URL of the allowlisted instance.
    pub base_url: String,

    /// Cached profile snippet and other access metadata.
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// When the last successful sync finished.
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "Secret")]
    Secret,
}

impl Related<Secret> for Entity {
    fn to() -> RelationDef {
        Relation::Secret.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
