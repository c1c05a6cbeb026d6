//! Canvas LMS integration.
//!
//! `client` talks to the external API, `types` describes the raw JSON it
//! returns, and `mapper` turns raw records into the internal shapes that
//! the storage layer persists. Only `client` performs I/O.

pub mod client;
pub mod mapper;
pub mod types;

pub use client::{CanvasClient, CanvasError};
pub use mapper::{CourseSkip, MappedProfile, MappedUnit};
pub use types::{RawCourse, RawEnrollment, RawProfile};
