//! Unit entity model
//!
//! One course, either mirrored from Canvas (external_id set) or created
//! manually by the owner. Sync creates and updates units but never
//! deletes them; deletion is an explicit user action and cascades to the
//! unit's assignments, exams, events and grades.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use super::account::Entity as Account;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, serde::Serialize, serde::Deserialize)]
#[sea_orm(table_name = "units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: Uuid,

    /// Mirror account this unit came from, if synced.
    pub account_id: Option<Uuid>,

    /// Canvas course id; null for manually created units.
    pub external_id: Option<String>,

    /// Course code, e.g. "MXB202_25se2"; null when unparseable.
    pub code: Option<String>,

    /// Display title after code cleanup.
    pub title: String,

    pub canvas_url: Option<String>,

    /// Parsed teaching period; both null means "no recognizable period".
    pub year: Option<i32>,
    pub semester: Option<i32>,

    /// Enrollment role attributed to this course for the owner.
    pub role: Option<String>,

    /// Cleaned syllabus text, bounded length.
    pub syllabus: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Account",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    #[sea_orm(has_many = "super::assignment::Entity")]
    Assignment,
    #[sea_orm(has_many = "super::exam::Entity")]
    Exam,
    #[sea_orm(has_many = "super::event::Entity")]
    Event,
    #[sea_orm(has_many = "super::grade::Entity")]
    Grade,
}

impl Related<Account> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
