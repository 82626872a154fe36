//! Shared error and configuration types

pub mod config;
pub mod unified_error;
