//! Shared domain types for the Soulwave project.

pub mod chat;
pub mod config;
pub mod events;
pub mod telemetry;
pub mod vision;

mod errors;

pub use errors::{Result, SoulwaveError};
