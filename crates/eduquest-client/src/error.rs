//! Error types for the EduQuest API client

use serde_json::Value;
use std::collections::BTreeMap;
use storage::StorageError;

/// Field name to list of validation messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Message used when the error body carries none of the known fields
const FALLBACK_MESSAGE: &str = "request failed";

/// Error returned by every client operation
///
/// Server-reported failures carry their real HTTP status; anything that never
/// produced a response (transport failure, timeout, local misconfiguration)
/// reports status 0.
///
/// # Examples
/// ```
/// use eduquest_client::ApiError;
///
/// let error = ApiError::Connection("dns lookup failed".to_string());
/// assert_eq!(error.status(), 0);
/// assert_eq!(error.to_string(), "connection error");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response from the backend
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Message extracted from the error body
        message: String,
        /// Per-field validation messages, when the backend sent any
        field_errors: Option<FieldErrors>,
    },

    /// Refresh failed after a 401 and the session was cleared
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// No response was received
    #[error("connection error")]
    Connection(String),

    /// Refresh was requested without a stored refresh token
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The request body could not be encoded as JSON
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A 2xx response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The shared client was used before `configure`
    #[error("API client is not configured")]
    NotConfigured,
}

impl ApiError {
    /// Build an error from a non-2xx response body
    ///
    /// The message is taken from `message`, `detail` or `error`, in that
    /// order. Field errors come from an `errors` object, or from a body whose
    /// values are all lists of strings.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let message = ["message", "detail", "error"]
            .iter()
            .find_map(|key| body.get(key).and_then(Value::as_str))
            .unwrap_or(FALLBACK_MESSAGE)
            .to_string();

        let field_errors = body
            .get("errors")
            .and_then(|errors| collect_field_errors(errors, true))
            .or_else(|| collect_field_errors(body, false));

        ApiError::Http { status, message, field_errors }
    }

    /// HTTP status associated with this error
    ///
    /// Returns 401 for an expired session and 0 for errors that never reached
    /// the backend.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::SessionExpired(_) => 401,
            _ => 0,
        }
    }

    /// User-facing message
    pub fn message(&self) -> String {
        match self {
            ApiError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Per-field validation messages
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Http { field_errors, .. } => field_errors.as_ref(),
            _ => None,
        }
    }

    /// Whether this is a 4xx rejection other than 401
    pub fn is_validation_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if (400..500).contains(status) && *status != 401)
    }

    /// Whether no response was received
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ApiError::Connection(_))
    }

    /// Whether the session was cleared and the user must log in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Connection(err.to_string())
    }
}

fn collect_field_errors(value: &Value, allow_plain: bool) -> Option<FieldErrors> {
    let object = value.as_object()?;
    if object.is_empty() {
        return None;
    }

    let mut errors = FieldErrors::new();
    for (field, messages) in object {
        let list = match messages {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?,
            Value::String(message) if allow_plain => vec![message.clone()],
            _ => return None,
        };
        errors.insert(field.clone(), list);
    }

    Some(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_precedence() {
        let err = ApiError::from_response(400, &json!({"detail": "d", "message": "m"}));
        assert_eq!(err.message(), "m");

        let err = ApiError::from_response(403, &json!({"detail": "No autorizado"}));
        assert_eq!(err.message(), "No autorizado");

        let err = ApiError::from_response(500, &json!({"error": "boom"}));
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_fallback_message() {
        let err = ApiError::from_response(502, &Value::Null);
        assert_eq!(err.message(), "request failed");
        assert_eq!(err.status(), 502);
        assert!(err.field_errors().is_none());
    }

    #[test]
    fn test_portal_errors_field() {
        let body = json!({
            "message": "Datos inválidos",
            "errors": {"email": ["Formato inválido"], "nombre": "Requerido"}
        });
        let err = ApiError::from_response(422, &body);

        let fields = err.field_errors().unwrap();
        assert_eq!(fields["email"], vec!["Formato inválido".to_string()]);
        assert_eq!(fields["nombre"], vec!["Requerido".to_string()]);
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_drf_style_body() {
        let body = json!({"username": ["This field is required."]});
        let err = ApiError::from_response(400, &body);

        assert_eq!(err.message(), "request failed");
        let fields = err.field_errors().unwrap();
        assert_eq!(fields["username"], vec!["This field is required.".to_string()]);
    }

    #[test]
    fn test_detail_body_has_no_field_errors() {
        let body = json!({"detail": "Not found.", "code": 404});
        let err = ApiError::from_response(404, &body);
        assert!(err.field_errors().is_none());
    }

    #[test]
    fn test_plain_message_body_has_no_field_errors() {
        let err = ApiError::from_response(403, &json!({"detail": "No autorizado"}));
        assert!(err.field_errors().is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::SessionExpired("x".into()).status(), 401);
        assert_eq!(ApiError::Connection("x".into()).status(), 0);
        assert_eq!(ApiError::NoRefreshToken.status(), 0);
        assert_eq!(ApiError::NotConfigured.status(), 0);
    }

    #[test]
    fn test_unauthorized_is_not_validation() {
        let err = ApiError::from_response(401, &json!({"detail": "bad token"}));
        assert!(!err.is_validation_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ApiError::Connection("timeout".into()).to_string(), "connection error");
        assert_eq!(ApiError::NoRefreshToken.to_string(), "no refresh token available");
        assert_eq!(ApiError::Connection("timeout".into()).message(), "connection error");
    }
}
