//! ApiClient - authenticated client for the EduQuest backends
//!
//! The client attaches the current access token to every request. When a
//! request comes back 401 it refreshes the token once and re-issues the
//! request once. If the refresh fails the session is cleared and observers
//! receive [`SessionEvent::Expired`] carrying the route of the login page.
//!
//! # Example
//!
//! ```rust,no_run
//! use eduquest_client::{ApiClient, ClientConfig};
//! use serde_json::json;
//! use storage::LocalStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new(ClientConfig::admin(), LocalStore::in_memory()?)?;
//!
//!     client.login(&json!({"username": "ana", "password": "secreto"})).await?;
//!     let cursos = client.get("/cursos/").await?;
//!
//!     println!("{}", cursos);
//!     Ok(())
//! }
//! ```

use parking_lot::RwLock as SyncRwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{ClientConfig, EnvelopeMode};
use crate::http::{unwrap_envelope, ApiRequest, HttpMethod, HttpTransport};
use crate::session::{find_token, is_jwt_expired, Session, SessionStore, ACCESS_TOKEN_FIELDS};
use crate::{ApiError, Result};
use storage::LocalStore;

// =============================================================================
// Session Events
// =============================================================================

/// Session lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session created by login
    Created,
    /// Access token replaced by a refresh
    Refreshed,
    /// Refresh failed; the host should navigate to `login_route`
    Expired {
        /// Route of the login page
        login_route: String,
    },
    /// Session cleared by logout
    LoggedOut,
}

/// Receives session lifecycle events
///
/// Any `Fn(&SessionEvent)` closure is an observer.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    /// Called after the session changed
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

// =============================================================================
// Request State
// =============================================================================

/// Lifecycle of one call to [`ApiClient::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Built, not yet sent
    Pending,
    /// First attempt sent
    Sent,
    /// First attempt came back 401
    AuthFailed,
    /// Refresh call in flight
    Refreshing,
    /// Second attempt sent with the new token
    RetrySent,
    /// Refresh failed
    RefreshFailed,
    /// 2xx received
    Success,
    /// Error returned without clearing the session
    Failed,
    /// Session cleared after a failed refresh
    SessionCleared,
}

impl RequestState {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Success | RequestState::Failed | RequestState::SessionCleared)
    }

    /// Whether `next` may follow this state
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Sent, Success)
                | (Sent, AuthFailed)
                | (Sent, Failed)
                | (AuthFailed, Refreshing)
                | (Refreshing, RetrySent)
                | (Refreshing, RefreshFailed)
                | (RetrySent, Success)
                | (RetrySent, Failed)
                | (RefreshFailed, SessionCleared)
        )
    }
}

struct RequestTrace<'a> {
    state: RequestState,
    request: &'a ApiRequest,
}

impl<'a> RequestTrace<'a> {
    fn new(request: &'a ApiRequest) -> Self {
        Self { state: RequestState::Pending, request }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid request transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(
            method = %self.request.method,
            path = %self.request.path,
            from = ?self.state,
            to = ?next,
            "request state"
        );
        self.state = next;
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Authenticated API client
///
/// Cheap to share behind an `Arc`; every method takes `&self` and many
/// requests may be in flight at once. Two requests that both see a 401 each
/// run their own refresh.
pub struct ApiClient {
    config: ClientConfig,
    transport: HttpTransport,
    store: SessionStore,
    session: RwLock<Option<Session>>,
    observers: SyncRwLock<Vec<Arc<dyn SessionObserver>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl ApiClient {
    /// Create a client
    ///
    /// A session already persisted in `store` is restored immediately.
    pub fn new(config: ClientConfig, store: LocalStore) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        let store = SessionStore::new(store);
        let session = store.load()?;

        if session.is_some() {
            tracing::debug!(base_url = %config.base_url, "restored persisted session");
        }

        Ok(Self {
            config,
            transport,
            store,
            session: RwLock::new(session),
            observers: SyncRwLock::new(Vec::new()),
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Local store holding the session
    pub fn store(&self) -> &LocalStore {
        self.store.local_store()
    }

    /// Current session
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Current access token
    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    /// Whether a session is held
    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Register a session observer
    pub fn on_session_event<O>(&self, observer: O)
    where
        O: SessionObserver + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Reload the persisted session into memory
    ///
    /// Call on application start. An already expired access token is kept;
    /// the first 401 will trigger the refresh.
    pub async fn init(&self) -> Result<Option<Session>> {
        let restored = self.store.load()?;

        match &restored {
            Some(session) if session.access_expires_at().is_some() && is_jwt_expired(&session.access_token) => {
                tracing::info!(
                    can_refresh = session.has_refresh_token(),
                    "restored session has an expired access token"
                );
            }
            Some(_) => tracing::info!("session restored"),
            None => tracing::debug!("no persisted session"),
        }

        *self.session.write().await = restored.clone();
        Ok(restored)
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Perform a request and return the normalized response body
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use eduquest_client::{ApiClient, ClientConfig, HttpMethod};
    /// # use storage::LocalStore;
    /// # use std::collections::HashMap;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ApiClient::new(ClientConfig::portal(), LocalStore::in_memory()?)?;
    ///
    /// let mut query = HashMap::new();
    /// query.insert("estado".to_string(), "activa".to_string());
    ///
    /// let misiones = client.request(HttpMethod::Get, "/misiones", None, Some(&query)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        let mut request = ApiRequest::new(method, path);
        if let Some(query) = query {
            request = request.params(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    /// Perform a request and deserialize the normalized body
    pub async fn request_as<T>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.request(method, path, body, query).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected response shape for {}: {}", path, e)))
    }

    /// GET a path
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.execute(ApiRequest::get(path)).await
    }

    /// GET a path with query parameters
    pub async fn get_with_params(&self, path: &str, query: &HashMap<String, String>) -> Result<Value> {
        self.execute(ApiRequest::get(path).params(query)).await
    }

    /// POST a JSON body
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::post(path).json_body(body)?).await
    }

    /// PUT a JSON body
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::new(HttpMethod::Put, path).json_body(body)?).await
    }

    /// PATCH a JSON body
    pub async fn patch<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::new(HttpMethod::Patch, path).json_body(body)?).await
    }

    /// DELETE a path
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(ApiRequest::new(HttpMethod::Delete, path)).await
    }

    /// Execute a request with refresh-and-retry
    ///
    /// At most two calls to `request.path` are made. Login and refresh
    /// endpoints are never retried.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let mut trace = RequestTrace::new(&request);
        let retryable = !self.config.is_auth_endpoint(&request.path);

        let token = self.access_token().await;
        trace.advance(RequestState::Sent);
        let response = match self.transport.send(&request, token.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                trace.advance(RequestState::Failed);
                return Err(err);
            }
        };

        if response.is_success() {
            trace.advance(RequestState::Success);
            return Ok(unwrap_envelope(response.body, self.config.envelope));
        }

        if !(response.is_unauthorized() && retryable) {
            trace.advance(RequestState::Failed);
            return Err(response.into_error());
        }

        trace.advance(RequestState::AuthFailed);
        trace.advance(RequestState::Refreshing);

        let new_token = match self.refresh_session().await {
            Ok(token) => token,
            Err(err @ ApiError::SessionExpired(_)) => {
                trace.advance(RequestState::RefreshFailed);
                trace.advance(RequestState::SessionCleared);
                return Err(err);
            }
            Err(err) => {
                trace.advance(RequestState::RefreshFailed);
                self.expire_session(&err).await;
                trace.advance(RequestState::SessionCleared);
                return Err(ApiError::SessionExpired(err.to_string()));
            }
        };

        trace.advance(RequestState::RetrySent);
        let retried = match self.transport.send(&request, Some(&new_token)).await {
            Ok(response) => response,
            Err(err) => {
                trace.advance(RequestState::Failed);
                return Err(err);
            }
        };

        if retried.is_success() {
            trace.advance(RequestState::Success);
            Ok(unwrap_envelope(retried.body, self.config.envelope))
        } else {
            trace.advance(RequestState::Failed);
            Err(retried.into_error())
        }
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    /// Log in with backend-specific credentials
    ///
    /// Accepts `{access, refresh}` (admin) and `{token, ...}` (portal)
    /// responses, with or without a `data` envelope.
    pub async fn login<C>(&self, credentials: &C) -> Result<Session>
    where
        C: Serialize + ?Sized,
    {
        let request = ApiRequest::post(&self.config.login_path).json_body(credentials)?;
        let response = self.transport.send(&request, None).await?;

        if !response.is_success() {
            tracing::info!(status = response.status, "login rejected");
            return Err(response.into_error());
        }

        let body = unwrap_envelope(response.body, EnvelopeMode::UnwrapData);
        let session = Session::from_response(&body)
            .ok_or_else(|| ApiError::InvalidResponse("login response has no access token".to_string()))?;

        self.store.save(&session)?;
        *self.session.write().await = Some(session.clone());

        tracing::info!(has_refresh_token = session.has_refresh_token(), "session created");
        self.emit(SessionEvent::Created);

        Ok(session)
    }

    /// Clear the session and the persisted tokens
    pub async fn logout(&self) -> Result<()> {
        *self.session.write().await = None;
        self.store.clear()?;

        tracing::info!("logged out");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Exchange the refresh token for a new access token
    ///
    /// Fails with [`ApiError::NoRefreshToken`] before any network call when
    /// no refresh token is held. A refresh token persisted without an access
    /// token is used too. The refresh token itself is kept.
    ///
    /// The new token is only committed when the session still holds the
    /// refresh token that was sent; a logout or new login while the call is
    /// in flight discards it with [`ApiError::SessionExpired`].
    pub async fn refresh_session(&self) -> Result<String> {
        let Some(refresh_token) = self.current_refresh_token().await? else {
            tracing::warn!("refresh requested without a refresh token");
            return Err(ApiError::NoRefreshToken);
        };

        let request = ApiRequest::post(&self.config.refresh_path).json(json!({ "refresh": &refresh_token }));
        let response = self.transport.send(&request, None).await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, "token refresh rejected");
            return Err(response.into_error());
        }

        let body = unwrap_envelope(response.body, EnvelopeMode::UnwrapData);
        let access_token = find_token(&body, &ACCESS_TOKEN_FIELDS)
            .ok_or_else(|| ApiError::InvalidResponse("refresh response has no access token".to_string()))?;

        {
            let mut session = self.session.write().await;
            match session.as_mut() {
                Some(current) if current.refresh_token.as_deref() == Some(refresh_token.as_str()) => {
                    self.store.save_access_token(&access_token)?;
                    current.access_token = access_token.clone();
                }
                None if self.store.load_refresh_token()?.as_deref() == Some(refresh_token.as_str()) => {
                    let restored = Session::new(access_token.clone(), Some(refresh_token));
                    self.store.save(&restored)?;
                    *session = Some(restored);
                }
                _ => {
                    tracing::info!("session changed during token refresh, discarding new token");
                    return Err(ApiError::SessionExpired("session ended during token refresh".to_string()));
                }
            }
        }

        tracing::info!("access token refreshed");
        self.emit(SessionEvent::Refreshed);

        Ok(access_token)
    }

    /// Unauthenticated request: no bearer, no refresh, no session side effects
    ///
    /// For public endpoints such as the active visual configuration.
    pub async fn request_public(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        let mut request = ApiRequest::new(method, path);
        if let Some(query) = query {
            request = request.params(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.transport.send(&request, None).await?;
        if response.is_success() {
            Ok(unwrap_envelope(response.body, self.config.envelope))
        } else {
            tracing::debug!(path = %path, status = response.status, "public request failed");
            Err(response.into_error())
        }
    }

    /// GET a public path without credentials
    pub async fn get_public(&self, path: &str) -> Result<Value> {
        self.request_public(HttpMethod::Get, path, None, None).await
    }

    async fn current_refresh_token(&self) -> Result<Option<String>> {
        let session = self.session.read().await;
        match session.as_ref() {
            Some(current) => Ok(current.refresh_token.clone().filter(|t| !t.is_empty())),
            None => Ok(self.store.load_refresh_token()?),
        }
    }

    async fn expire_session(&self, reason: &ApiError) {
        *self.session.write().await = None;
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted session");
        }

        tracing::warn!(
            login_route = %self.config.login_route,
            reason = %reason,
            "session expired"
        );
        self.emit(SessionEvent::Expired { login_route: self.config.login_route.clone() });
    }

    fn emit(&self, event: SessionEvent) {
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();
        for observer in observers {
            observer.on_event(&event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
