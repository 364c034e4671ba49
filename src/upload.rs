#![doc = "Concrete object stores: bridges the `ObjectStore` trait to an HTTP bucket endpoint or a local directory."]
//
//! # Object stores
//!
//! - [`HttpObjectStore`]: path-style HTTP bucket. `PUT {endpoint}/{bucket}/{key}` per upload,
//!   one `DELETE` per key for batch deletes. An optional bearer token is sent with every
//!   request; request signing, retries and multipart uploads are out of scope.
//! - [`LocalObjectStore`]: mirrors objects into a local directory. Handy for previews,
//!   staging directories and end-to-end tests.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, error, info};

use crate::content_type::CONTENT_LENGTH;
use crate::contract::{DeleteOptions, ObjectStore, PutOptions, StoreError};

/// Environment variable holding the bearer token for [`HttpObjectStore`].
pub const TOKEN_ENV: &str = "BUCKET_SYNC_TOKEN";

pub struct HttpObjectStore {
    http: Client,
    endpoint: Url,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: impl Into<String>) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(format!("endpoint {endpoint} cannot carry object paths").into());
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            bucket: bucket.into(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build a store, picking up the bearer token from the environment (or `.env`) if set.
    pub fn new_from_env(endpoint: &str, bucket: impl Into<String>) -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        let store = Self::new(endpoint, bucket)?;
        match std::env::var(TOKEN_ENV) {
            Ok(token) => {
                info!(token_set = !token.is_empty(), "Initialized HttpObjectStore from environment");
                Ok(store.with_token(token))
            }
            Err(_) => {
                info!("No {TOKEN_ENV} in environment, sending unauthenticated requests");
                Ok(store)
            }
        }
    }

    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| -> StoreError { "endpoint cannot carry object paths".into() })?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn delete_one(&self, key: &str, quiet: bool) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let response = self.authorize(self.http.delete(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(key, "Object already absent");
            return Ok(());
        }
        response.error_for_status()?;
        if quiet {
            debug!(key, "Deleted object");
        } else {
            info!(key, "Deleted object");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], options: &PutOptions) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let mut req = self.http.put(url).body(bytes.to_vec());
        for (name, value) in &options.headers {
            // The client computes the length from the body itself.
            if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
                continue;
            }
            req = req.header(name.as_str(), value.as_str());
        }

        match self.authorize(req).send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => {
                debug!(key, size = bytes.len(), "Uploaded object");
                Ok(())
            }
            Err(e) => {
                error!(error = ?e, key, "HTTP error uploading object");
                Err(Box::new(e))
            }
        }
    }

    async fn delete_many(
        &self,
        keys: &[String],
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        let deletions = keys.iter().map(|key| self.delete_one(key, options.quiet));
        try_join_all(deletions).await?;
        info!(count = keys.len(), "Deleted objects");
        Ok(())
    }
}

/// Object store that writes every object to `root/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("refusing key outside the store root: {key}").into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], _options: &PutOptions) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key, path = %path.display(), "Stored object");
        Ok(())
    }

    async fn delete_many(
        &self,
        keys: &[String],
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        for key in keys {
            let path = self.object_path(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    if !options.quiet {
                        info!(key = %key, "Deleted object");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Box::new(e)),
            }
        }
        Ok(())
    }
}
