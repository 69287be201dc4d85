//! # CTV Common Library
//!
//! Shared code for the Circuit TV services including:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Event types (CueEvent enum) and the broadcast EventBus
//! - Server-Sent Events helpers
//! - Database initialization
//! - Time utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
