// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven client configuration.
//!
//! [`ClientConfig`] can be built programmatically or derived from the process
//! environment. Parsing is side-effect free apart from reading
//! `std::env::vars`, and tests feed their own key/value pairs through
//! [`ClientConfig::from_env_iter`].

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::http::{HttpClientOptions, TokenFactory};

/// Project whose configuration document is managed.
const ENV_PROJECT_ID: &str = "REMOTE_CONFIG_PROJECT_ID";
/// Overrides the service endpoint (scheme + host).
const ENV_BASE_URL: &str = "REMOTE_CONFIG_BASE_URL";
/// Static OAuth2 bearer token.
const ENV_ACCESS_TOKEN: &str = "REMOTE_CONFIG_ACCESS_TOKEN";
/// Request deadline in whole seconds.
const ENV_TIMEOUT_SECS: &str = "REMOTE_CONFIG_TIMEOUT_SECS";
/// Allows `http://` endpoints (emulators, tests).
const ENV_ALLOW_PLAINTEXT: &str = "REMOTE_CONFIG_ALLOW_PLAINTEXT";

pub const DEFAULT_BASE_URL: &str = "https://firebaseremoteconfig.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing project id (set REMOTE_CONFIG_PROJECT_ID)")]
    MissingProjectId,
}

/// Settings used to construct a [`crate::RemoteConfigClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub project_id: String,
    pub base_url: String,
    /// Bearer token source; `None` sends unauthenticated requests.
    pub token: Option<TokenFactory>,
    pub timeout: Duration,
    pub allow_plaintext: bool,
}

impl ClientConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            allow_plaintext: false,
        }
    }

    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Result<Self, ConfigError> {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs.
    pub fn from_env_iter<I, K, V>(iter: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let project_id = map
            .get(ENV_PROJECT_ID)
            .and_then(|value| sanitize_non_empty(value))
            .ok_or(ConfigError::MissingProjectId)?;
        let base_url = map
            .get(ENV_BASE_URL)
            .and_then(|value| sanitize_non_empty(value))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let token = map
            .get(ENV_ACCESS_TOKEN)
            .and_then(|value| sanitize_non_empty(value))
            .map(|token| TokenFactory::new_from_static_token(&token));
        // Unparseable or zero timeouts fall back to the default.
        let timeout = map
            .get(ENV_TIMEOUT_SECS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let allow_plaintext = parse_bool(map.get(ENV_ALLOW_PLAINTEXT).map(String::as_str), false);

        Ok(Self {
            project_id,
            base_url,
            token,
            timeout,
            allow_plaintext,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: TokenFactory) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allow_plaintext(mut self, allow_plaintext: bool) -> Self {
        self.allow_plaintext = allow_plaintext;
        self
    }

    pub fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            allow_plaintext: self.allow_plaintext,
            timeout: self.timeout,
        }
    }
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}
