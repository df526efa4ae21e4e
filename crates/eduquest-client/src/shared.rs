//! Process-wide client instance
//!
//! Each application configures one client at startup and reaches it from
//! anywhere through [`shared`].

use parking_lot::RwLock;
use std::sync::Arc;

use crate::{ApiClient, ApiError, ClientConfig, Result};
use storage::{LocalStore, StorageConfig};

static SHARED_CLIENT: RwLock<Option<Arc<ApiClient>>> = parking_lot::const_rwlock(None);

/// Configure the shared client
///
/// Calling this again with an equal configuration returns the existing
/// instance untouched. A different configuration replaces it; the session
/// store is kept when the store path did not change.
pub fn configure(config: ClientConfig) -> Result<Arc<ApiClient>> {
    let mut slot = SHARED_CLIENT.write();

    if let Some(existing) = slot.as_ref() {
        if existing.config() == &config {
            tracing::debug!("shared client already configured");
            return Ok(existing.clone());
        }
    }

    let store = match slot.as_ref() {
        Some(existing) if existing.config().store_path == config.store_path => existing.store().clone(),
        _ => open_store(&config)?,
    };

    let client = Arc::new(ApiClient::new(config, store)?);
    tracing::info!(base_url = %client.config().base_url, "configured shared API client");

    *slot = Some(client.clone());
    Ok(client)
}

/// The shared client
pub fn shared() -> Result<Arc<ApiClient>> {
    SHARED_CLIENT.read().clone().ok_or(ApiError::NotConfigured)
}

/// Drop the shared client, returning it if one was configured
pub fn teardown() -> Option<Arc<ApiClient>> {
    SHARED_CLIENT.write().take()
}

fn open_store(config: &ClientConfig) -> Result<LocalStore> {
    let store = match &config.store_path {
        Some(path) => LocalStore::open(StorageConfig::new(path))?,
        None => LocalStore::in_memory()?,
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // One test drives the global so parallel tests cannot interleave.
    #[test]
    fn test_shared_lifecycle() {
        teardown();
        assert!(matches!(shared(), Err(ApiError::NotConfigured)));

        let first = configure(ClientConfig::admin()).unwrap();
        let again = configure(ClientConfig::admin()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &shared().unwrap()));

        let replaced = configure(ClientConfig::admin().with_timeout(Duration::from_secs(3))).unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert_eq!(shared().unwrap().config().timeout, Duration::from_secs(3));

        first.store().set("accessToken", "A1").unwrap();
        assert_eq!(replaced.store().get::<String>("accessToken").unwrap(), Some("A1".to_string()));

        assert!(configure(ClientConfig::new("not-a-url")).is_err());
        assert!(Arc::ptr_eq(&replaced, &shared().unwrap()));

        assert!(teardown().is_some());
        assert!(matches!(shared(), Err(ApiError::NotConfigured)));
    }
}
