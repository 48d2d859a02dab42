// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration document model and its JSON wire contract.
//!
//! A [`ConfigDocument`] is an immutable snapshot of the remote configuration:
//! version metadata, conditions, top-level parameters and named parameter
//! groups. The concurrency token (`ETag`) travels out of band in HTTP headers
//! and is therefore never part of the serialized body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ordered_map::OrderedMap;

/// Conditional overrides keyed by condition name, in document order.
pub type ConditionalValues = OrderedMap<String, ParameterValue>;

/// Full configuration snapshot as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// Concurrency token taken from the `ETag` response header.
    #[serde(skip)]
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub parameter_groups: BTreeMap<String, ParameterGroup>,
}

impl ConfigDocument {
    /// Builds a document for writing that inherits `source`'s concurrency token.
    pub fn derive_from(source: &ConfigDocument) -> Self {
        Self {
            etag: source.etag.clone(),
            ..Self::default()
        }
    }

    /// Looks up a parameter in the top-level map or inside `group`.
    ///
    /// Returns `None` for the group when it does not exist, and `Some(None)`
    /// when the group exists but the key does not.
    pub fn group_parameter(&self, group: &str, key: &str) -> Option<Option<&Parameter>> {
        if group.is_empty() {
            return Some(self.parameters.get(key));
        }
        self.parameter_groups
            .get(group)
            .map(|group| group.parameters.get(key))
    }

    /// Returns the version number when the service reported one.
    pub fn version_number(&self) -> Option<i64> {
        self.version.as_ref().and_then(|v| v.version_number)
    }
}

/// A named, flat namespace of parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
}

/// Declared type of a parameter's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    String,
    Boolean,
    Number,
    Json,
    #[default]
    #[serde(rename = "PARAMETER_VALUE_TYPE_UNSPECIFIED", other)]
    Unspecified,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Json => "json",
            ValueType::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Channel through which a version was published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOrigin {
    Console,
    RestApi,
    AdminSdkNode,
    #[default]
    #[serde(rename = "REMOTE_CONFIG_UPDATE_ORIGIN_UNSPECIFIED", other)]
    Unspecified,
}

/// How a version replaced its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateType {
    IncrementalUpdate,
    ForcedUpdate,
    Rollback,
    #[default]
    #[serde(rename = "REMOTE_CONFIG_UPDATE_TYPE_UNSPECIFIED", other)]
    Unspecified,
}

/// A remote parameter with its default and conditional values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_values: Option<ConditionalValues>,
}

impl Parameter {
    /// Creates a parameter of `value_type` whose default is the literal `value`.
    pub fn with_default(value_type: ValueType, value: impl Into<String>) -> Self {
        Self {
            value_type,
            default_value: Some(ParameterValue::literal(value)),
            ..Self::default()
        }
    }

    /// Resolves the value to decode and the declared type.
    ///
    /// The explicit default wins; otherwise the oldest conditional value is
    /// used. Condition expressions are never evaluated. Returns `None` when the
    /// parameter carries neither.
    pub fn resolve(&self) -> Option<(&str, ValueType)> {
        if let Some(default) = &self.default_value {
            return Some((default.effective_value(), self.value_type));
        }
        self.conditional_values
            .as_ref()
            .and_then(|values| values.oldest())
            .map(|(_, value)| (value.effective_value(), self.value_type))
    }
}

/// One of a parameter's possible values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_in_app_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization_value: Option<PersonalizationValue>,
}

impl ParameterValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn in_app_default() -> Self {
        Self {
            use_in_app_default: Some(true),
            ..Self::default()
        }
    }

    pub fn personalization(personalization_id: impl Into<String>) -> Self {
        Self {
            personalization_value: Some(PersonalizationValue {
                personalization_id: personalization_id.into(),
            }),
            ..Self::default()
        }
    }

    /// The literal value, or the empty string when there is none.
    pub fn effective_value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationValue {
    pub personalization_id: String,
}

/// Named condition. Expressions are carried verbatim and never evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub name: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_color: Option<String>,
}

/// Version metadata attached to every published document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default, with = "quoted_i64", skip_serializing_if = "Option::is_none")]
    pub version_number: Option<i64>,
    /// RFC 3339 timestamp of the publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_origin: Option<UpdateOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<UpdateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_user: Option<UpdateUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, with = "quoted_i64", skip_serializing_if = "Option::is_none")]
    pub rollback_source: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_legacy: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One page of version history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPage {
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_page_token: String,
}

/// Integers the service transmits as JSON strings (`"42"`).
///
/// Plain JSON numbers are accepted on input as well.
pub(crate) mod quoted_i64 {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(number) => serializer.serialize_str(&number.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(number)) => Ok(Some(number)),
            Some(Raw::Text(text)) if text.is_empty() => Ok(None),
            Some(Raw::Text(text)) => text
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format_args!("invalid quoted integer {text:?}"))),
        }
    }
}
