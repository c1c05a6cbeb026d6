//! # Data Models
//!
//! SeaORM entity models for the Unitrack API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod account;
pub mod assignment;
pub mod connection;
pub mod event;
pub mod exam;
pub mod grade;
pub mod secret;
pub mod unit;

pub use account::Entity as Account;
pub use assignment::Entity as Assignment;
pub use connection::Entity as Connection;
pub use event::Entity as Event;
pub use exam::Entity as Exam;
pub use grade::Entity as Grade;
pub use secret::Entity as Secret;
pub use unit::Entity as Unit;

/// The one LMS provider this service supports.
pub const PROVIDER_CANVAS: &str = "canvas";

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "unitrack".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
