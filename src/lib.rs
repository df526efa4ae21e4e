//! EduQuest
//!
//! Client-side foundation shared by the EduQuest admin panel and the
//! teacher/student portal.

#![warn(missing_docs)]

pub use eduquest_client;
pub use eduquest_core;
pub use storage;

pub use eduquest_client::{ApiClient, ApiError, ClientConfig, ClientSettings, Session, SessionEvent};
pub use eduquest_core::{Resource, ThemeConfig, ThemeService};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default of `level` for the EduQuest crates.
pub fn init_tracing(level: tracing::Level) -> Result<()> {
    let level_str = level.as_str().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("eduquest={level_str},eduquest_client={level_str},eduquest_core={level_str},storage={level_str}")
            .into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}
