//! Core application logic for EduQuest
//!
//! This crate contains the features shared by the admin panel and the
//! portal on top of the authenticated client: institution branding and
//! REST resource access.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branding;
pub mod resources;

pub use branding::{hex_to_rgb, ReloadHandle, ThemeConfig, ThemeService};
pub use resources::{PathStyle, Resource};

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// API error
    #[error(transparent)]
    Api(#[from] eduquest_client::ApiError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Response did not match the expected shape
    #[error("Unexpected response from {path}: {source}")]
    Decode {
        /// Request path
        path: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
