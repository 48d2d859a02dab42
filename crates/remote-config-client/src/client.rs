// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote client for the configuration document.
//!
//! Every write is conditional on the concurrency token (`ETag`) of the document
//! it was derived from. When the service answers `409 Conflict` to the first
//! attempt, the client fetches the current token once and retries; a second
//! conflict is returned to the caller. Documents returned by mutating calls
//! carry the service's fresh token and should replace the caller's copy.

use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError};
use crate::http::{HttpError, HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor, IF_MATCH};
use crate::model::{ConfigDocument, Version, VersionPage};

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors returned by [`RemoteConfigClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The service answered with an unexpected status.
    #[error("unexpected status {status} {reason}: {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
    /// The update still conflicted after refetching the token and retrying once.
    #[error("update conflicted after retrying with a refreshed concurrency token: {body}")]
    Conflict { body: String },
    /// The document has no concurrency token to submit as a precondition.
    #[error("document has no concurrency token; fetch it before updating")]
    MissingEtag,
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode {context} response: {source}")]
    Decode {
        context: &'static str,
        source: serde_json::Error,
    },
}

/// Options for [`RemoteConfigClient::update_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Overwrite regardless of the current token (`If-Match: *`).
    pub force: bool,
    /// Ask the service to validate the document without publishing it.
    pub validate_only: bool,
}

/// Filters and paging for version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVersionsOptions {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    /// Newest version to include.
    pub end_version_number: Option<i64>,
    /// RFC 3339 lower bound on the update time.
    pub start_time: Option<String>,
    /// RFC 3339 upper bound on the update time.
    pub end_time: Option<String>,
}

impl ListVersionsOptions {
    fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(page_size) = self.page_size {
            request = request.query("pageSize", page_size.to_string());
        }
        if let Some(token) = self.page_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.query("pageToken", token);
        }
        if let Some(end) = self.end_version_number {
            request = request.query("endVersionNumber", end.to_string());
        }
        if let Some(start) = &self.start_time {
            request = request.query("startTime", start.as_str());
        }
        if let Some(end) = &self.end_time {
            request = request.query("endTime", end.as_str());
        }
        request
    }
}

/// Client for one project's configuration document.
#[derive(Debug, Clone)]
pub struct RemoteConfigClient<E = ReqwestExecutor> {
    executor: E,
    resource: String,
}

impl RemoteConfigClient<ReqwestExecutor> {
    /// Builds a client talking to the service over `reqwest`.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.project_id.trim().is_empty() {
            return Err(ConfigError::MissingProjectId.into());
        }
        let executor = ReqwestExecutor::new(
            config.base_url.clone(),
            CLIENT_VERSION,
            config.token.clone(),
            config.http_options(),
        )?;
        Ok(Self::with_executor(&config.project_id, executor))
    }
}

impl<E: HttpExecutor> RemoteConfigClient<E> {
    pub fn with_executor(project_id: &str, executor: E) -> Self {
        Self {
            executor,
            resource: format!("/v1/projects/{project_id}/remoteConfig"),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Fetches the current document.
    pub async fn fetch(&self) -> Result<ConfigDocument, ClientError> {
        let response = self.get_current().await?;
        into_document(response, "fetch")
    }

    /// Fetches a historical version of the document.
    pub async fn fetch_version(&self, version_number: i64) -> Result<ConfigDocument, ClientError> {
        let request = HttpRequest::new(Method::GET, self.resource.as_str())
            .query("versionNumber", version_number.to_string());
        let response = self.executor.execute(request).await?;
        into_document(response, "fetch version")
    }

    /// Publishes `document`, conditional on its concurrency token.
    pub async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, ClientError> {
        self.update_with_options(document, UpdateOptions::default())
            .await
    }

    pub async fn update_with_options(
        &self,
        document: &ConfigDocument,
        options: UpdateOptions,
    ) -> Result<ConfigDocument, ClientError> {
        let precondition = if options.force {
            "*".to_string()
        } else if document.etag.is_empty() {
            return Err(ClientError::MissingEtag);
        } else {
            document.etag.clone()
        };
        let body = serde_json::to_vec(document).map_err(ClientError::Encode)?;

        let response = self.put(&body, &precondition, options).await?;
        if response.status != StatusCode::CONFLICT {
            return into_document(response, "update");
        }

        debug!(
            etag = %precondition,
            "remote-config update conflicted; refetching concurrency token"
        );
        let current = self.get_current().await?;
        check_status(&current)?;
        let refreshed = current.etag();
        if refreshed.is_empty() {
            return Err(ClientError::MissingEtag);
        }

        let retried = self.put(&body, &refreshed, options).await?;
        if retried.status == StatusCode::CONFLICT {
            return Err(ClientError::Conflict {
                body: retried.body_text(),
            });
        }
        into_document(retried, "update")
    }

    /// Replaces `document` with the current server copy, token included.
    ///
    /// `document` is left untouched when the fetch fails.
    pub async fn refresh(&self, document: &mut ConfigDocument) -> Result<(), ClientError> {
        *document = self.fetch().await?;
        Ok(())
    }

    /// Publishes `document` and replaces it with the service's response.
    ///
    /// On error `document` keeps its local edits and stale token.
    pub async fn update_in_place(&self, document: &mut ConfigDocument) -> Result<(), ClientError> {
        *document = self.update(document).await?;
        Ok(())
    }

    /// Rolls the document back to `version_number`. Not conditional.
    pub async fn rollback(&self, version_number: i64) -> Result<ConfigDocument, ClientError> {
        let body = serde_json::to_vec(&json!({ "versionNumber": version_number.to_string() }))
            .map_err(ClientError::Encode)?;
        let request =
            HttpRequest::new(Method::POST, format!("{}:rollback", self.resource)).json_body(body);
        let response = self.executor.execute(request).await?;
        into_document(response, "rollback")
    }

    /// Fetches one page of version history.
    pub async fn list_versions_page(
        &self,
        options: &ListVersionsOptions,
    ) -> Result<VersionPage, ClientError> {
        let request = options.apply(HttpRequest::new(
            Method::GET,
            format!("{}:listVersions", self.resource),
        ));
        let response = self.executor.execute(request).await?;
        check_status(&response)?;
        parse_body(&response, "list versions")
    }

    /// Follows page tokens until exhausted and returns every version.
    pub async fn list_all_versions(
        &self,
        mut options: ListVersionsOptions,
    ) -> Result<Vec<Version>, ClientError> {
        let mut versions = Vec::new();
        loop {
            let page = self.list_versions_page(&options).await?;
            versions.extend(page.versions);
            if page.next_page_token.is_empty() {
                return Ok(versions);
            }
            options.page_token = Some(page.next_page_token);
        }
    }

    async fn get_current(&self) -> Result<HttpResponse, HttpError> {
        self.executor
            .execute(HttpRequest::new(Method::GET, self.resource.as_str()))
            .await
    }

    async fn put(
        &self,
        body: &[u8],
        precondition: &str,
        options: UpdateOptions,
    ) -> Result<HttpResponse, ClientError> {
        let if_match =
            HeaderValue::from_str(precondition).map_err(|_| HttpError::InvalidHeader("if-match"))?;
        let mut request = HttpRequest::new(Method::PUT, self.resource.as_str())
            .header(IF_MATCH, if_match)
            .json_body(body.to_vec());
        if options.validate_only {
            request = request.query("validateOnly", "true");
        }
        Ok(self.executor.execute(request).await?)
    }
}

fn check_status(response: &HttpResponse) -> Result<(), ClientError> {
    if response.status == StatusCode::OK {
        return Ok(());
    }
    Err(ClientError::Status {
        status: response.status.as_u16(),
        reason: response
            .status
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
        body: response.body_text(),
    })
}

fn parse_body<T: DeserializeOwned>(
    response: &HttpResponse,
    context: &'static str,
) -> Result<T, ClientError> {
    serde_json::from_slice(&response.body).map_err(|source| ClientError::Decode { context, source })
}

/// Validates the status and stamps the response's `ETag` onto the document.
fn into_document(
    response: HttpResponse,
    context: &'static str,
) -> Result<ConfigDocument, ClientError> {
    check_status(&response)?;
    let mut document: ConfigDocument = parse_body(&response, context)?;
    document.etag = response.etag();
    if document.etag.is_empty() {
        debug!(context, "remote-config response carried no ETag");
    }
    Ok(document)
}
