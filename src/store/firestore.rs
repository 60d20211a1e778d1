//! Firestore client over the v1 REST API.
//!
//! Only the read calls discovery needs are implemented: listing collection
//! ids, listing documents, and fetching the first document of a collection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::prelude::*;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{Document, DocumentStore, fields_from_rest};
use crate::error::{
    ClientBuildSnafu, DecodeSnafu, HttpSnafu, StatusSnafu, StoreError, TokenCommandSnafu,
    TokenRejectedSnafu,
};

const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Default limit on a single REST call, connection included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer token the emulator accepts for admin access.
const EMULATOR_TOKEN: &str = "owner";

/// Connection settings for a Firestore database.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database id, `(default)` for the default database.
    pub database: String,
    /// `host:port` of a local emulator; bypasses authentication.
    pub emulator_host: Option<String>,
    /// Explicit OAuth access token; otherwise gcloud is asked for one.
    pub access_token: Option<String>,
    /// Page size for list calls.
    pub page_size: u32,
    /// Limit on each REST call.
    pub request_timeout: Duration,
}

impl FirestoreConfig {
    /// Build a config for `project_id`, picking up `FIRESTORE_EMULATOR_HOST`
    /// and `GOOGLE_OAUTH_ACCESS_TOKEN` from the environment.
    pub fn from_env(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            access_token: std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            page_size: 300,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCollectionIdsResponse {
    #[serde(default)]
    collection_ids: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RestDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestDocument {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

/// Firestore document store backed by the REST API.
pub struct FirestoreStore {
    client: reqwest::Client,
    config: FirestoreConfig,
    token: OnceCell<String>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context(ClientBuildSnafu)?;
        Ok(Self {
            client,
            config,
            token: OnceCell::new(),
        })
    }

    /// Resource name prefix of every document, without a trailing slash.
    fn documents_name(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.config.project_id, self.config.database
        )
    }

    fn documents_url(&self) -> String {
        let base = match &self.config.emulator_host {
            Some(host) => format!("http://{host}/v1"),
            None => FIRESTORE_ENDPOINT.to_string(),
        };
        format!("{base}/{}", self.documents_name())
    }

    /// Strip the resource prefix from a document name, leaving its path.
    fn relative_path<'a>(&self, name: &'a str) -> &'a str {
        let prefix = self.documents_name();
        name.strip_prefix(prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(name)
    }

    async fn access_token(&self) -> Result<&str, StoreError> {
        self.token
            .get_or_try_init(|| async {
                if self.config.emulator_host.is_some() {
                    return Ok(EMULATOR_TOKEN.to_string());
                }
                if let Some(token) = &self.config.access_token {
                    return Ok(token.clone());
                }
                gcloud_access_token().await
            })
            .await
            .map(String::as_str)
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder, url: &str) -> Result<T, StoreError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .context(HttpSnafu { url })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu { url })?;
        if !status.is_success() {
            return StatusSnafu {
                url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu { url })
    }

    async fn list_documents_page(
        &self,
        collection: &str,
        page_size: u32,
        page_token: Option<&str>,
        show_missing: bool,
    ) -> Result<ListDocumentsResponse, StoreError> {
        let url = format!("{}/{collection}", self.documents_url());
        let mut query = vec![("pageSize", page_size.to_string())];
        if show_missing {
            query.push(("showMissing", "true".to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        self.send(self.client.get(&url).query(&query), &url).await
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list_collections(&self, parent: Option<&str>) -> Result<Vec<String>, StoreError> {
        let url = match parent {
            Some(parent) => format!("{}/{parent}:listCollectionIds", self.documents_url()),
            None => format!("{}:listCollectionIds", self.documents_url()),
        };

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({ "pageSize": self.config.page_size });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }
            let page: ListCollectionIdsResponse =
                self.send(self.client.post(&url).json(&body), &url).await?;
            ids.extend(page.collection_ids);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(parent = parent.unwrap_or("/"), count = ids.len(), "Listed collections");
        Ok(ids)
    }

    async fn list_document_paths(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut paths = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            // showMissing surfaces documents that only exist as parents of subcollections
            let page = self
                .list_documents_page(collection, self.config.page_size, page_token.as_deref(), true)
                .await?;
            paths.extend(
                page.documents
                    .iter()
                    .map(|doc| self.relative_path(&doc.name).to_string()),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(paths)
    }

    async fn first_document(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        let page = self.list_documents_page(collection, 1, None, false).await?;
        Ok(page.documents.into_iter().next().map(|doc| Document {
            path: self.relative_path(&doc.name).to_string(),
            fields: fields_from_rest(doc.fields.as_ref()),
        }))
    }
}

/// Ask the gcloud CLI for an access token for the active account.
async fn gcloud_access_token() -> Result<String, StoreError> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .context(TokenCommandSnafu)?;

    ensure!(
        output.status.success(),
        TokenRejectedSnafu {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    );

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
