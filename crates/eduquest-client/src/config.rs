//! Client configuration
//!
//! `ClientConfig` is built programmatically; `ClientSettings` layers optional
//! TOML files and `EDUQUEST_*` environment variables on top of a preset.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ApiError, Result};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How successful response bodies are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMode {
    /// Return `body.data` when present and non-null, else `body`
    #[default]
    UnwrapData,
    /// Return the body as received
    Raw,
}

/// Configuration for an [`ApiClient`](crate::ApiClient)
///
/// # Examples
/// ```
/// use eduquest_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::portal()
///     .with_base_url("https://api.eduquest.test/api/v1")
///     .with_header("X-Profesor-Id", "7")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.endpoint("/misiones"), "https://api.eduquest.test/api/v1/misiones");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin plus path prefix every request path is appended to
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Path of the token refresh endpoint
    pub refresh_path: String,
    /// Path of the login endpoint
    pub login_path: String,
    /// Path fragments that mark a request as an auth endpoint
    pub auth_paths: Vec<String>,
    /// Route the host navigates to when the session expires
    pub login_route: String,
    /// Response envelope handling
    pub envelope: EnvelopeMode,
    /// Directory of the persistent store used by the shared client
    pub store_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("eduquest-client/{}", env!("CARGO_PKG_VERSION")),
            default_headers: BTreeMap::new(),
            refresh_path: "/token/refresh/".to_string(),
            login_path: "/token/".to_string(),
            auth_paths: vec!["/token/".to_string(), "/auth/login".to_string()],
            login_route: "/login".to_string(),
            envelope: EnvelopeMode::UnwrapData,
            store_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Preset for the admin panel (Django backend, SimpleJWT)
    pub fn admin() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            login_path: "/token/".to_string(),
            refresh_path: "/token/refresh/".to_string(),
            login_route: "/admin/login".to_string(),
            ..Default::default()
        }
    }

    /// Preset for the teacher and student portal
    pub fn portal() -> Self {
        Self {
            base_url: "http://localhost:8081/api/v1".to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/token/refresh/".to_string(),
            login_route: "/login".to_string(),
            ..Default::default()
        }
    }

    /// Set the base URL; a trailing slash is dropped
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set the refresh endpoint path
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set the login endpoint path
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Add a path fragment that excludes matching requests from refresh-and-retry
    pub fn with_auth_path(mut self, fragment: impl Into<String>) -> Self {
        self.auth_paths.push(fragment.into());
        self
    }

    /// Set the route carried by the session-expired event
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Set the envelope mode
    pub fn with_envelope(mut self, envelope: EnvelopeMode) -> Self {
        self.envelope = envelope;
        self
    }

    /// Persist the shared client's session under this directory
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Absolute URL for a request path
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Whether a request path targets login or refresh
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        [self.refresh_path.as_str(), self.login_path.as_str()]
            .into_iter()
            .chain(self.auth_paths.iter().map(String::as_str))
            .filter(|fragment| !fragment.is_empty())
            .any(|fragment| path.contains(fragment))
    }

    /// Check the configuration before a client is built from it
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::Configuration(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ApiError::Configuration("timeout must be non-zero".to_string()));
        }
        if self.refresh_path.is_empty() {
            return Err(ApiError::Configuration("refresh path must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Which preset a settings file starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppProfile {
    /// Admin panel
    #[default]
    Admin,
    /// Teacher and student portal
    Portal,
}

/// File and environment settings for a client
///
/// Every field is optional; unset fields keep the profile's preset value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSettings {
    /// Preset to start from
    #[serde(default)]
    pub profile: AppProfile,
    /// Base URL override
    pub base_url: Option<String>,
    /// Timeout override in seconds
    pub timeout_secs: Option<u64>,
    /// User agent override
    pub user_agent: Option<String>,
    /// Refresh path override
    pub refresh_path: Option<String>,
    /// Login path override
    pub login_path: Option<String>,
    /// Login route override
    pub login_route: Option<String>,
    /// Envelope mode override
    pub envelope: Option<EnvelopeMode>,
    /// Store directory
    pub store_path: Option<PathBuf>,
    /// Extra default headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ClientSettings {
    /// Load settings from `eduquest.toml`, `config/eduquest.toml` and
    /// `EDUQUEST_*` environment variables, later sources winning
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("eduquest").required(false))
                .add_source(config::File::with_name("config/eduquest").required(false)),
        )
    }

    /// Load settings from one explicit file plus the environment
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(config::File::from(path.as_ref()).required(true)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            .add_source(config::Environment::with_prefix("EDUQUEST").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<ClientSettings>())
            .map_err(|e| ApiError::Configuration(e.to_string()))?;

        tracing::debug!(profile = ?settings.profile, "loaded client settings");
        Ok(settings)
    }

    /// Resolve into a client configuration
    pub fn into_config(self) -> ClientConfig {
        let mut config = match self.profile {
            AppProfile::Admin => ClientConfig::admin(),
            AppProfile::Portal => ClientConfig::portal(),
        };

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(path) = self.refresh_path {
            config.refresh_path = path;
        }
        if let Some(path) = self.login_path {
            config.login_path = path;
        }
        if let Some(route) = self.login_route {
            config.login_route = route;
        }
        if let Some(envelope) = self.envelope {
            config.envelope = envelope;
        }
        config.store_path = self.store_path.or(config.store_path);
        config.default_headers.extend(self.headers);

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.envelope, EnvelopeMode::UnwrapData);
        assert!(config.user_agent.starts_with("eduquest-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let admin = ClientConfig::admin();
        assert_eq!(admin.base_url, "http://localhost:8000/api");
        assert_eq!(admin.login_path, "/token/");
        assert_eq!(admin.login_route, "/admin/login");

        let portal = ClientConfig::portal();
        assert_eq!(portal.base_url, "http://localhost:8081/api/v1");
        assert_eq!(portal.login_path, "/auth/login");
        assert_eq!(portal.login_route, "/login");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("http://api.test/")
            .with_timeout(Duration::from_secs(3))
            .with_user_agent("tests/1.0")
            .with_header("X-Estudiante-Id", "42")
            .with_envelope(EnvelopeMode::Raw);

        assert_eq!(config.base_url, "http://api.test");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.user_agent, "tests/1.0");
        assert_eq!(config.default_headers.get("X-Estudiante-Id"), Some(&"42".to_string()));
        assert_eq!(config.envelope, EnvelopeMode::Raw);
    }

    #[test]
    fn test_endpoint_joining() {
        let config = ClientConfig::new("http://api.test/api");
        assert_eq!(config.endpoint("/users/"), "http://api.test/api/users/");
        assert_eq!(config.endpoint("users/"), "http://api.test/api/users/");
        assert_eq!(config.endpoint("https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn test_auth_endpoint_detection() {
        let config = ClientConfig::admin();
        assert!(config.is_auth_endpoint("/token/"));
        assert!(config.is_auth_endpoint("/token/refresh/"));
        assert!(config.is_auth_endpoint("/auth/login"));
        assert!(!config.is_auth_endpoint("/users/"));
        assert!(!config.is_auth_endpoint("/cursos/3/"));

        let config = ClientConfig::portal().with_auth_path("/auth/register");
        assert!(config.is_auth_endpoint("/auth/register"));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(ClientConfig::new("ftp://nope").validate().is_err());
        assert!(ClientConfig::default().with_timeout(Duration::ZERO).validate().is_err());
        assert!(ClientConfig::default().with_refresh_path("").validate().is_err());
    }

    #[test]
    fn test_settings_into_config() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Profesor-Id".to_string(), "9".to_string());

        let settings = ClientSettings {
            profile: AppProfile::Portal,
            base_url: Some("https://portal.test/api/v1/".to_string()),
            timeout_secs: Some(30),
            envelope: Some(EnvelopeMode::Raw),
            headers,
            ..Default::default()
        };

        let config = settings.into_config();
        assert_eq!(config.base_url, "https://portal.test/api/v1");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.login_path, "/auth/login");
        assert_eq!(config.envelope, EnvelopeMode::Raw);
        assert_eq!(config.default_headers.get("X-Profesor-Id"), Some(&"9".to_string()));
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
profile = "admin"
base_url = "https://admin.test/api"
timeout_secs = 4
login_route = "/admin/entrar"

[headers]
x-actor-id = "1"
"#
        )
        .unwrap();

        let config = ClientSettings::from_file(&path).unwrap().into_config();
        assert_eq!(config.base_url, "https://admin.test/api");
        assert_eq!(config.timeout, Duration::from_secs(4));
        assert_eq!(config.login_route, "/admin/entrar");
        assert_eq!(config.default_headers.get("x-actor-id"), Some(&"1".to_string()));
    }
}
