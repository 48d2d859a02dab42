// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for a versioned remote key-value configuration service.
//!
//! The crate fetches a project's configuration document, decodes parameter
//! values into application-defined structures, and publishes updates under
//! optimistic concurrency control:
//!
//! - [`model`] holds the document and its JSON wire contract;
//! - [`decode`] projects a document onto structures implementing [`Decode`];
//! - [`client`] implements fetch, conditional update with a single
//!   conflict retry, rollback and version listing;
//! - [`http`] is the transport seam and its `reqwest` implementation.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod decode;
pub mod http;
pub mod model;
pub mod ordered_map;

mod test_support;

pub use client::{ClientError, ListVersionsOptions, RemoteConfigClient, UpdateOptions};
pub use config::{ClientConfig, ConfigError};
pub use decode::{decode, Decode, DecodeError, Field, FieldKind, FieldRef};
pub use http::{
    HttpClientOptions, HttpError, HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor,
    TokenFactory,
};
pub use model::{
    Condition, ConditionalValues, ConfigDocument, Parameter, ParameterGroup, ParameterValue,
    PersonalizationValue, UpdateOrigin, UpdateType, UpdateUser, ValueType, Version, VersionPage,
};
pub use ordered_map::OrderedMap;
