//! EduQuest Branding
//!
//! The institution's visual identity (name, logo, palette) is configured in
//! the admin backend and read by both frontends. [`ThemeService`] fetches the
//! active configuration, caches it in the local store and falls back to the
//! cached copy, then to the built-in EduQuest palette, when the backend is
//! unreachable.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::resources::Resource;
use crate::Result;
use eduquest_client::ApiClient;
use storage::{keys, LocalStore, StorageError};

/// Application name
pub const APP_NAME: &str = "EduQuest";

/// Path of the active visual configuration
pub const ACTIVE_THEME_PATH: &str = "/configuracion-visual/activa/";

/// Default reload period for [`ThemeService::start_reloading`]
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest reload period accepted by [`ThemeService::start_reloading`]
pub const MIN_RELOAD_INTERVAL: Duration = Duration::from_secs(1);

/// Default palette
pub mod colors {
    /// Primary color
    pub const PRIMARY: &str = "#3B82F6";

    /// Secondary color
    pub const SECONDARY: &str = "#6366F1";

    /// Accent color
    pub const ACCENT: &str = "#8B5CF6";

    /// Background color
    pub const BACKGROUND: &str = "#F9FAFB";
}

/// Visual configuration of the institution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Backend id (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Logo URL
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Institution name
    pub nombre_institucion: String,
    /// Primary color, `#RRGGBB`
    pub color_primario: String,
    /// Secondary color, `#RRGGBB`
    pub color_secundario: String,
    /// Accent color, `#RRGGBB`
    pub color_acento: String,
    /// Background color, `#RRGGBB`
    pub color_fondo: String,
    /// Whether this is the active configuration
    #[serde(default = "default_activo")]
    pub activo: bool,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_creacion: Option<String>,
    /// Last update timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_actualizacion: Option<String>,
}

fn default_activo() -> bool {
    true
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            id: None,
            logo_url: Some(String::new()),
            nombre_institucion: APP_NAME.to_string(),
            color_primario: colors::PRIMARY.to_string(),
            color_secundario: colors::SECONDARY.to_string(),
            color_acento: colors::ACCENT.to_string(),
            color_fondo: colors::BACKGROUND.to_string(),
            activo: true,
            fecha_creacion: None,
            fecha_actualizacion: None,
        }
    }
}

impl ThemeConfig {
    /// CSS custom properties the frontends set on the document root
    ///
    /// The `-rgb` variants are only emitted for colors that parse as
    /// `#RRGGBB`.
    pub fn css_variables(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("--color-primario".to_string(), self.color_primario.clone()),
            ("--color-secundario".to_string(), self.color_secundario.clone()),
            ("--color-acento".to_string(), self.color_acento.clone()),
            ("--color-fondo".to_string(), self.color_fondo.clone()),
        ];

        for (name, color) in [
            ("--color-primario-rgb", &self.color_primario),
            ("--color-secundario-rgb", &self.color_secundario),
            ("--color-acento-rgb", &self.color_acento),
        ] {
            if let Some(rgb) = hex_to_rgb(color) {
                vars.push((name.to_string(), rgb));
            }
        }

        vars
    }

    /// Render the variables as a `:root { ... }` stylesheet
    pub fn to_css(&self) -> String {
        let body: String = self
            .css_variables()
            .into_iter()
            .map(|(name, value)| format!("  {}: {};\n", name, value))
            .collect();
        format!(":root {{\n{}}}\n", body)
    }
}

/// Convert `#RRGGBB` (leading `#` optional) to `"r, g, b"`
///
/// # Examples
/// ```
/// use eduquest_core::branding::hex_to_rgb;
///
/// assert_eq!(hex_to_rgb("#3B82F6").as_deref(), Some("59, 130, 246"));
/// assert_eq!(hex_to_rgb("#FFF"), None);
/// ```
pub fn hex_to_rgb(hex: &str) -> Option<String> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    let (r, g, b) = (channel(0..2)?, channel(2..4)?, channel(4..6)?);
    Some(format!("{}, {}, {}", r, g, b))
}

/// Loads, caches and publishes the active theme
///
/// # Example
///
/// ```rust,no_run
/// use eduquest_client::{ApiClient, ClientConfig};
/// use eduquest_core::branding::ThemeService;
/// use storage::LocalStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = LocalStore::in_memory()?;
///     let client = Arc::new(ApiClient::new(ClientConfig::admin(), store.clone())?);
///     let themes = ThemeService::new(client, store);
///
///     let theme = themes.load().await;
///     println!("{}", theme.to_css());
///     Ok(())
/// }
/// ```
pub struct ThemeService {
    themes: Resource<ThemeConfig>,
    store: LocalStore,
    current: watch::Sender<ThemeConfig>,
}

impl ThemeService {
    /// Create a service; the cached theme (or the default) is current until
    /// the first load
    pub fn new(client: Arc<ApiClient>, store: LocalStore) -> Self {
        let initial = read_cached(&store).unwrap_or_default();
        let (current, _) = watch::channel(initial);

        Self {
            themes: Resource::new(client, "/configuracion-visual"),
            store,
            current,
        }
    }

    /// Fetch the active theme from the backend
    ///
    /// The endpoint is public; no credentials are sent and a rejection never
    /// touches the session.
    pub async fn fetch(&self) -> Result<ThemeConfig> {
        self.themes.get_public("activa").await
    }

    /// Fetch the active theme, falling back to the cache, then the default
    pub async fn load(&self) -> ThemeConfig {
        match self.fetch().await {
            Ok(theme) => {
                if let Err(e) = self.apply_update(theme.clone()) {
                    tracing::warn!(error = %e, "failed to cache theme");
                }
                theme
            }
            Err(e) => {
                let fallback = self.cached();
                tracing::warn!(error = %e, cached = fallback.is_some(), "theme fetch failed, using fallback");

                let theme = fallback.unwrap_or_default();
                self.current.send_replace(theme.clone());
                theme
            }
        }
    }

    /// Cached theme, if a valid one is stored
    pub fn cached(&self) -> Option<ThemeConfig> {
        read_cached(&self.store)
    }

    /// Cache a new theme and publish it to subscribers
    pub fn apply_update(&self, theme: ThemeConfig) -> std::result::Result<(), StorageError> {
        self.store.set(keys::THEME_CONFIG, &theme)?;
        tracing::debug!(institucion = %theme.nombre_institucion, "theme updated");
        self.current.send_replace(theme);
        Ok(())
    }

    /// Theme currently in effect
    pub fn current(&self) -> ThemeConfig {
        self.current.borrow().clone()
    }

    /// Subscribe to theme changes
    pub fn subscribe(&self) -> watch::Receiver<ThemeConfig> {
        self.current.subscribe()
    }

    /// Reload the theme periodically so admin changes reach open sessions
    ///
    /// The first reload happens immediately. Periods shorter than
    /// [`MIN_RELOAD_INTERVAL`] are raised to it. Dropping the handle stops it.
    pub fn start_reloading(self: &Arc<Self>, interval: Duration) -> ReloadHandle {
        let interval = interval.max(MIN_RELOAD_INTERVAL);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        let service = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.load().await;
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        ReloadHandle { stop_tx: Some(stop_tx), _handle: handle }
    }
}

fn read_cached(store: &LocalStore) -> Option<ThemeConfig> {
    match store.get::<ThemeConfig>(keys::THEME_CONFIG) {
        Ok(theme) => theme,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable cached theme");
            None
        }
    }
}

/// Handle for a periodic theme reload
///
/// When dropped, the reload task is stopped.
pub struct ReloadHandle {
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl ReloadHandle {
    /// Stop reloading
    pub fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ReloadHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
