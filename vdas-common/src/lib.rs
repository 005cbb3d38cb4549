//! # VDAS Common Library
//!
//! Shared code for the vehicle damage assessment services:
//! - Error types
//! - TOML bootstrap configuration and root folder resolution
//! - Timestamp helpers for persisted records

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
