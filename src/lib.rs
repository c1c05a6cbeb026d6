//! # Unitrack API Library
//!
//! Backend for a personal university tracker: links a local account to a
//! Canvas LMS instance, syncs profile and course mirrors, and stores the
//! tracker entities that hang off each unit.

pub mod allowlist;
pub mod auth;
pub mod canvas;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub use migration;
