// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    Error,
    api::{Project, ProjectID, ProjectPage, RawTask},
    retry::{create_retry_policy, log_retry_configuration},
    storage::{FileKeyStorage, KeyStorage, MemoryKeyStorage},
};
use log::{Level, debug, error, log_enabled, trace, warn};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;
use url::Url;

/// Client for the annotation server's REST API.
///
/// The client handles the connection to the annotation server and manages
/// the API key, request authorization, and retrieval of projects and
/// annotation tasks. Requests carry the stored API key as a
/// `Authorization: Token ...` header; when no key is configured, requests
/// are sent unauthenticated and the server will reject them.
///
/// # Examples
///
/// ```no_run
/// use labelwatch_client::{Client, ProjectID};
///
/// # async fn example() -> Result<(), labelwatch_client::Error> {
/// let client = Client::new("http://localhost:8080")?.with_key("my-api-key")?;
///
/// let projects = client.projects(None).await?;
/// for project in &projects {
///     println!("{}", project);
/// }
///
/// let tasks = client.labeled_tasks(ProjectID::from(1), 100_000).await?;
/// println!("{} labeled tasks", tasks.len());
/// # Ok(())
/// # }
/// ```
///
/// Client is Clone but cannot derive Debug due to dyn KeyStorage
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
    key: Arc<RwLock<String>>,
    /// Key storage backend. When set, keys are automatically persisted.
    storage: Option<Arc<dyn KeyStorage>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

impl Client {
    /// Create a new client for the annotation server at the given base URL.
    ///
    /// By default, the client uses [`FileKeyStorage`] for API key
    /// persistence and loads any previously stored key. Use
    /// [`with_storage`][Self::with_storage],
    /// [`with_memory_storage`][Self::with_memory_storage], or
    /// [`with_no_storage`][Self::with_no_storage] to configure storage
    /// behavior.
    pub fn new(server: &str) -> Result<Self, Error> {
        log_retry_configuration();

        // Get timeout from environment or use default
        let timeout_secs = std::env::var("LABELWATCH_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30); // Default 30s timeout for API calls

        // Single HTTP client with URL-based retry policy: API calls fail
        // fast on authorization errors while media fetches retry all
        // transient failures. See retry.rs for details.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .retry(create_retry_policy())
            .build()?;

        let url = Self::validate_server(server)?;

        // Default to file storage, loading any existing key
        let storage: Arc<dyn KeyStorage> = match FileKeyStorage::new() {
            Ok(file_storage) => Arc::new(file_storage),
            Err(e) => {
                warn!(
                    "Could not initialize file key storage: {}. Using memory storage.",
                    e
                );
                Arc::new(MemoryKeyStorage::new())
            }
        };

        let key = match storage.load() {
            Ok(Some(k)) => k,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(
                    "Failed to load API key from storage: {}. Starting with empty key.",
                    e
                );
                String::new()
            }
        };

        Ok(Client {
            http,
            url,
            key: Arc::new(RwLock::new(key)),
            storage: Some(storage),
        })
    }

    /// Parse and normalize the server base URL, rejecting non-HTTP schemes.
    fn validate_server(server: &str) -> Result<String, Error> {
        let parsed = Url::parse(server)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidParameters(format!(
                "Server URL must use http or https: {}",
                server
            )));
        }
        Ok(server.trim_end_matches('/').to_string())
    }

    /// Returns a new client connected to a different annotation server.
    ///
    /// The stored API key is kept; annotation servers of one deployment
    /// share their key store.
    pub fn with_server(&self, server: &str) -> Result<Self, Error> {
        Ok(Client {
            url: Self::validate_server(server)?,
            ..self.clone()
        })
    }

    /// Returns a new client authenticated with the provided API key.
    ///
    /// The key is automatically persisted to storage (if configured).
    pub fn with_key(&self, key: &str) -> Result<Self, Error> {
        if key.is_empty() {
            return Ok(self.clone());
        }

        // Persist key to storage if configured
        if let Some(ref storage) = self.storage
            && let Err(e) = storage.store(key)
        {
            warn!("Failed to persist API key to storage: {}", e);
        }

        Ok(Client {
            key: Arc::new(RwLock::new(key.to_string())),
            ..self.clone()
        })
    }

    /// Returns a new client with the specified key storage backend.
    ///
    /// Any key already present in the new storage is loaded.
    pub fn with_storage(self, storage: Arc<dyn KeyStorage>) -> Self {
        let key = match storage.load() {
            Ok(Some(k)) => k,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(
                    "Failed to load API key from storage: {}. Starting with empty key.",
                    e
                );
                String::new()
            }
        };

        Client {
            key: Arc::new(RwLock::new(key)),
            storage: Some(storage),
            ..self
        }
    }

    /// Returns a new client with in-memory key storage (no persistence).
    pub fn with_memory_storage(self) -> Self {
        Client {
            key: Arc::new(RwLock::new(String::new())),
            storage: Some(Arc::new(MemoryKeyStorage::new())),
            ..self
        }
    }

    /// Returns a new client with no key storage.
    pub fn with_no_storage(self) -> Self {
        Client {
            storage: None,
            ..self
        }
    }

    /// Returns the base URL of the annotation server.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the API key used to authorize requests.
    pub async fn api_key(&self) -> String {
        self.key.read().await.clone()
    }

    /// Verify the stored API key against the server.
    ///
    /// Lists projects as a cheap authorization probe; an invalid or missing
    /// key surfaces as [`Error::Unauthorized`].
    pub async fn verify_key(&self) -> Result<(), Error> {
        let _: ProjectPage = self.get("api/projects", &[]).await?;
        Ok(())
    }

    /// Clear the API key from memory and from storage (if configured).
    pub async fn logout(&self) -> Result<(), Error> {
        {
            let mut key = self.key.write().await;
            *key = "".to_string();
        }

        if let Some(ref storage) = self.storage
            && let Err(e) = storage.clear()
        {
            warn!("Failed to clear API key from storage: {}", e);
        }

        Ok(())
    }

    /// Returns the projects available on the server. If a name filter is
    /// provided, only projects whose title contains the filter
    /// (case-insensitive) are returned.
    pub async fn projects(&self, name: Option<&str>) -> Result<Vec<Project>, Error> {
        let page: ProjectPage = self.get("api/projects", &[]).await?;
        debug!("Server lists {} projects", page.count);

        match name {
            Some(name) => {
                let filter = name.to_lowercase();
                Ok(page
                    .results
                    .into_iter()
                    .filter(|p| p.title().to_lowercase().contains(&filter))
                    .collect())
            }
            None => Ok(page.results),
        }
    }

    /// Return the project with the specified project ID. If the project does
    /// not exist, an error is returned.
    pub async fn project(&self, project: ProjectID) -> Result<Project, Error> {
        self.get(&format!("api/projects/{}", project), &[]).await
    }

    /// Returns the tasks of a project as a single bulk page.
    ///
    /// `page_size` should exceed the expected task count so that one request
    /// retrieves the full project.
    pub async fn tasks(&self, project: ProjectID, page_size: u32) -> Result<Vec<RawTask>, Error> {
        self.get(
            &format!("api/projects/{}/tasks", project),
            &[("page_size", page_size.to_string())],
        )
        .await
    }

    /// Returns the tasks of a project that have been labeled.
    pub async fn labeled_tasks(
        &self,
        project: ProjectID,
        page_size: u32,
    ) -> Result<Vec<RawTask>, Error> {
        let tasks = self.tasks(project, page_size).await?;
        let total = tasks.len();
        let labeled: Vec<RawTask> = tasks.into_iter().filter(|task| task.is_labeled).collect();
        debug!("Project {}: {}/{} tasks labeled", project, labeled.len(), total);
        Ok(labeled)
    }

    /// Send a GET request to the server and deserialize the JSON response.
    ///
    /// The path is relative to the server base URL. The stored API key, when
    /// present, is attached as a `Token` authorization header; 401/403
    /// responses map to [`Error::Unauthorized`] and other non-success
    /// statuses to [`Error::ApiError`].
    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.url, path);

        if log_enabled!(Level::Trace) {
            trace!("GET {} {:?}", url, query);
        }

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", "LabelWatch Client");

        if !query.is_empty() {
            request = request.query(query);
        }

        let key = self.api_key().await;
        if !key.is_empty() {
            request = request.header("Authorization", format!("Token {}", key));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Unauthorized);
        }

        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::ApiError(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        if log_enabled!(Level::Trace) {
            trace!("Response: {}", String::from_utf8_lossy(&body));
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Ok(value),
            Err(err) => {
                error!("Invalid JSON Response: {}", String::from_utf8_lossy(&body));
                Err(err.into())
            }
        }
    }
}
