//! EduQuest API Client Library
//!
//! This crate provides the authenticated HTTP client shared by the EduQuest
//! admin panel and the teacher/student portal: bearer-token attachment,
//! one-shot refresh-and-retry on 401, session persistence and configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod shared;

pub use client::{ApiClient, RequestState, SessionEvent, SessionObserver};
pub use config::{AppProfile, ClientConfig, ClientSettings, EnvelopeMode, DEFAULT_TIMEOUT};
pub use error::{ApiError, FieldErrors};
pub use http::{ApiRequest, ApiResponse, HttpMethod};
pub use session::Session;
pub use shared::{configure, shared, teardown};

/// Result type for API client operations
pub type Result<T> = std::result::Result<T, ApiError>;
