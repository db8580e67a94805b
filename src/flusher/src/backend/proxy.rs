//! HTTP backend talking to the namespace proxy and the account service.
//!
//! Container listings come from the account service, object listings and
//! all deletions go through the proxy. Error responses are classified here,
//! once, so the engine only ever sees a [`BackendError`] kind.

use async_trait::async_trait;
use common::config::BackendConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    BackendError, BackendResult, ContainerEntry, DeleteReport, DeletionService, ListingService,
    ObjectListing,
};

/// Message fragment the metadata service uses when its group has no leader
const ELECTION_FAILED: &str = "Election failed";

/// Page size requested from both services
const PAGE_SIZE: &str = "1000";

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Per-object result of `content/delete_many`
#[derive(Debug, Deserialize)]
pub struct DeletedContent {
    pub name: String,
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteManyBody {
    #[serde(default)]
    pub contents: Vec<DeletedContent>,
}

#[derive(Debug, Deserialize)]
struct ContainerListingBody {
    #[serde(default)]
    listing: Vec<Vec<Value>>,
}

/// Backend implementation over the proxy REST API
#[derive(Debug, Clone)]
pub struct ProxyBackend {
    client: reqwest::Client,
    proxy_url: String,
    account_url: String,
    namespace: String,
}

impl ProxyBackend {
    /// Build a client for `namespace` using the configured endpoints
    pub fn new(config: &BackendConfig, namespace: &str) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            account_url: config.account_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
        })
    }

    fn proxy_endpoint(&self, path: &str) -> String {
        format!("{}/v3.0/{}/{}", self.proxy_url, self.namespace, path)
    }

    fn account_endpoint(&self, path: &str) -> String {
        format!("{}/v1.0/account/{}", self.account_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> BackendResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }
}

/// Map a non-success HTTP response to an error kind.
pub fn classify_error(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    classify(status, message)
}

/// Only the election signature is transient, whatever the status code
fn classify(status: u16, message: String) -> BackendError {
    if message.contains(ELECTION_FAILED) {
        return BackendError::ElectionFailed(message);
    }

    match status {
        404 => BackendError::NotFound(message),
        _ => BackendError::Http { status, message },
    }
}

/// Split a `delete_many` reply into removed and remaining names. Requested
/// names the reply does not mention count as remaining.
pub fn parse_delete_report(requested: &[String], body: DeleteManyBody) -> DeleteReport {
    let mut report = DeleteReport::default();
    for content in body.contents {
        if (200..300).contains(&content.status) {
            report.deleted.push(content.name);
        } else {
            let err = classify(content.status, content.message);
            report.failed.push((content.name, err));
        }
    }

    for name in requested {
        let mentioned = report.deleted.contains(name)
            || report.failed.iter().any(|(failed, _)| failed == name);
        if !mentioned {
            let err = BackendError::Decode(format!("no status returned for {name}"));
            report.failed.push((name.clone(), err));
        }
    }
    report
}

/// Decode one `[name, objects, bytes, is_prefix, mtime]` row.
pub fn parse_container_row(row: &[Value]) -> BackendResult<ContainerEntry> {
    let name = row
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Decode(format!("container row without name: {row:?}")))?;
    let number = |idx: usize| row.get(idx).and_then(Value::as_u64).unwrap_or(0);
    let is_partial = match row.get(3) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
        _ => false,
    };

    Ok(ContainerEntry {
        name: name.to_string(),
        file_count: number(1),
        byte_count: number(2),
        is_partial,
    })
}

#[async_trait]
impl ListingService for ProxyBackend {
    async fn check(&self, account: &str) -> BackendResult<()> {
        let response = self
            .client
            .get(self.account_endpoint("show"))
            .query(&[("id", account)])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn list_objects(&self, account: &str, container: &str) -> BackendResult<ObjectListing> {
        let response = self
            .client
            .get(self.proxy_endpoint("container/list"))
            .query(&[("acct", account), ("ref", container), ("max", PAGE_SIZE)])
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn list_containers(
        &self,
        account: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> BackendResult<Vec<ContainerEntry>> {
        let mut query = vec![("id", account), ("prefix", prefix), ("limit", PAGE_SIZE)];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }

        let response = self
            .client
            .get(self.account_endpoint("containers"))
            .query(&query)
            .send()
            .await?;
        let body: ContainerListingBody = Self::decode(response).await?;

        body.listing
            .iter()
            .map(|row| parse_container_row(row))
            .collect()
    }
}

#[async_trait]
impl DeletionService for ProxyBackend {
    async fn delete_objects(
        &self,
        account: &str,
        container: &str,
        names: &[String],
    ) -> BackendResult<DeleteReport> {
        let contents: Vec<Value> = names
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect();

        let response = self
            .client
            .post(self.proxy_endpoint("content/delete_many"))
            .query(&[("acct", account), ("ref", container)])
            .json(&serde_json::json!({ "contents": contents }))
            .send()
            .await?;
        let body: DeleteManyBody = Self::decode(response).await?;
        Ok(parse_delete_report(names, body))
    }

    async fn delete_container(&self, account: &str, container: &str) -> BackendResult<()> {
        let response = self
            .client
            .post(self.proxy_endpoint("container/destroy"))
            .query(&[("acct", account), ("ref", container)])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
