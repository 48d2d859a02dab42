// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory executor replaying scripted responses for client tests.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::http::{HttpError, HttpExecutor, HttpRequest, HttpResponse, ETAG, IF_MATCH};

/// Builds a response with an optional `ETag` and a JSON body.
pub(crate) fn response(status: u16, etag: Option<&str>, body: Value) -> HttpResponse {
    let mut headers = HeaderMap::new();
    if let Some(etag) = etag {
        headers.insert(ETAG, HeaderValue::from_str(etag).expect("valid etag"));
    }
    HttpResponse {
        status: StatusCode::from_u16(status).expect("valid status"),
        headers,
        body: serde_json::to_vec(&body).expect("serializable body"),
    }
}

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedExecutor {
    pub(crate) fn new(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    /// `If-Match` values sent with each PUT, in order.
    pub(crate) fn preconditions(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|request| request.method == Method::PUT)
            .filter_map(|request| request.headers.get(IF_MATCH))
            .map(|value| value.to_str().expect("ascii header").to_string())
            .collect()
    }
}

#[async_trait]
impl HttpExecutor for ScriptedExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().expect("lock poisoned").push(request);
        let next = self.responses.lock().expect("lock poisoned").pop_front();
        Ok(next.expect("no scripted response left"))
    }
}
