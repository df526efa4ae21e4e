//! REST resource helpers
//!
//! The admin backend exposes its collections (`/misiones/`, `/usuarios/`,
//! `/configuracion-visual/`, ...) as conventional REST resources. [`Resource`]
//! wraps one of them on top of the authenticated client, so every call goes
//! through the same refresh-and-retry path. Public endpoints are read with
//! [`Resource::get_public`] instead.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{CoreError, Result};
use eduquest_client::{ApiClient, HttpMethod};

/// How item and collection paths end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// `/misiones/` and `/misiones/{id}/`
    #[default]
    TrailingSlash,
    /// `/misiones` and `/misiones/{id}`
    Bare,
}

/// A REST collection of `T`
pub struct Resource<T> {
    client: Arc<ApiClient>,
    base: String,
    style: PathStyle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            base: self.base.clone(),
            style: self.style,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource").field("base", &self.base).field("style", &self.style).finish()
    }
}

impl<T> Resource<T>
where
    T: DeserializeOwned,
{
    /// Wrap the collection at `collection` (e.g. `"/misiones"`)
    pub fn new(client: Arc<ApiClient>, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let trimmed = collection.trim_matches('/');
        Self {
            client,
            base: format!("/{}", trimmed),
            style: PathStyle::default(),
            _marker: PhantomData,
        }
    }

    /// Use a different path style
    pub fn with_style(mut self, style: PathStyle) -> Self {
        self.style = style;
        self
    }

    /// Path of the collection
    pub fn collection_path(&self) -> String {
        self.finish(self.base.clone())
    }

    /// Path of one item (or a detail action such as `activa`)
    pub fn item_path(&self, id: impl fmt::Display) -> String {
        self.finish(format!("{}/{}", self.base, id))
    }

    fn finish(&self, path: String) -> String {
        match self.style {
            PathStyle::TrailingSlash => format!("{}/", path),
            PathStyle::Bare => path,
        }
    }

    /// List the collection
    ///
    /// A response that is not a JSON array yields an empty list.
    pub async fn list(&self, query: Option<&HashMap<String, String>>) -> Result<Vec<T>> {
        let path = self.collection_path();
        let value = self.client.request(HttpMethod::Get, &path, None, query).await?;

        match value {
            Value::Array(_) => decode(&path, value),
            other => {
                tracing::debug!(path = %path, kind = json_kind(&other), "list response is not an array");
                Ok(Vec::new())
            }
        }
    }

    /// Fetch one item
    pub async fn get(&self, id: impl fmt::Display) -> Result<T> {
        let path = self.item_path(id);
        let value = self.client.get(&path).await?;
        decode(&path, value)
    }

    /// Fetch one item from a public endpoint, without credentials
    pub async fn get_public(&self, id: impl fmt::Display) -> Result<T> {
        let path = self.item_path(id);
        let value = self.client.get_public(&path).await?;
        decode(&path, value)
    }

    /// Create an item
    pub async fn create<B>(&self, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let path = self.collection_path();
        let value = self.client.post(&path, body).await?;
        decode(&path, value)
    }

    /// Replace an item
    pub async fn update<B>(&self, id: impl fmt::Display, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let path = self.item_path(id);
        let value = self.client.put(&path, body).await?;
        decode(&path, value)
    }

    /// Partially update an item
    pub async fn partial_update<B>(&self, id: impl fmt::Display, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let path = self.item_path(id);
        let value = self.client.patch(&path, body).await?;
        decode(&path, value)
    }

    /// Delete an item
    pub async fn delete(&self, id: impl fmt::Display) -> Result<()> {
        let path = self.item_path(id);
        self.client.delete(&path).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| CoreError::Decode {
        path: path.to_string(),
        source,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
