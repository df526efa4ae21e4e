//! Session persistence
//!
//! Tokens are written under the same keys the browser frontends use, one key
//! per token, so a stored refresh token survives an access token rewrite.

use storage::{keys, LocalStore, StorageError};

use super::Session;

/// Reads and writes the session tokens in a [`LocalStore`]
#[derive(Debug, Clone)]
pub struct SessionStore {
    store: LocalStore,
}

impl SessionStore {
    /// Wrap a local store
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Underlying local store
    pub fn local_store(&self) -> &LocalStore {
        &self.store
    }

    /// Load the persisted session
    ///
    /// Returns `None` when no access token is stored; a lone refresh token is
    /// read with [`SessionStore::load_refresh_token`]. A value of the wrong
    /// type is treated as absent.
    pub fn load(&self) -> Result<Option<Session>, StorageError> {
        let Some(access_token) = self.read_token(keys::ACCESS_TOKEN)? else {
            return Ok(None);
        };
        let refresh_token = self.read_token(keys::REFRESH_TOKEN)?;

        Ok(Some(Session { access_token, refresh_token }))
    }

    /// Load the persisted refresh token on its own
    pub fn load_refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.read_token(keys::REFRESH_TOKEN)
    }

    /// Persist both tokens; a missing refresh token removes the stored one
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        self.store.set(keys::ACCESS_TOKEN, &session.access_token)?;
        match &session.refresh_token {
            Some(refresh) => self.store.set(keys::REFRESH_TOKEN, refresh)?,
            None => {
                self.store.remove(keys::REFRESH_TOKEN)?;
            }
        }
        Ok(())
    }

    /// Persist a new access token, leaving the refresh token untouched
    pub fn save_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        self.store.set(keys::ACCESS_TOKEN, access_token)
    }

    /// Remove both tokens
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove_many(&[keys::ACCESS_TOKEN, keys::REFRESH_TOKEN])?;
        Ok(())
    }

    fn read_token(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.store.get::<String>(key) {
            Ok(token) => Ok(token.filter(|t| !t.is_empty())),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!(key, error = %e, "ignoring malformed stored token");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
