//! Storage layer for EduQuest
//!
//! This crate provides the persistent key-value store that keeps session
//! tokens and the cached theme between runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod kv;

pub use kv::{LocalStore, Result, StorageConfig, StorageError};

/// Well-known keys written by the EduQuest clients
pub mod keys {
    /// Current access token
    pub const ACCESS_TOKEN: &str = "accessToken";
    /// Current refresh token
    pub const REFRESH_TOKEN: &str = "refreshToken";
    /// Cached visual configuration
    pub const THEME_CONFIG: &str = "temaConfig";
}
