//! Account entity model
//!
//! Denormalized mirror of the external Canvas user profile, unique per
//! (owner, provider, base_url). Re-sync upserts against that key.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use super::unit::Entity as Unit;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, serde::Serialize, serde::Deserialize)]
#[sea_orm(table_name = "lms_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: Uuid,
    pub provider: String,
    pub base_url: String,

    /// Canvas user id on that instance.
    pub external_id: String,

    pub name: Option<String>,
    pub short_name: Option<String>,
    pub sortable_name: Option<String>,
    pub avatar_url: Option<String>,
    pub primary_email: Option<String>,
    pub locale: Option<String>,

    /// ICS calendar feed URL exposed by Canvas.
    pub calendar_url: Option<String>,

    pub profile_synced_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "Unit")]
    Unit,
}

impl Related<Unit> for Entity {
    fn to() -> RelationDef {
        Relation::Unit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
