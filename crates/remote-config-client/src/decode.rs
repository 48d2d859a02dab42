// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed decoding of a [`ConfigDocument`] into application structures.
//!
//! A target structure implements [`Decode`] by listing its fields as
//! [`Field`]s: the declared name, an optional binding tag and a typed mutable
//! handle ([`FieldRef`]). The engine walks those fields, resolves each one to a
//! `(group, key)` pair in the document and coerces the parameter's literal
//! according to its declared [`ValueType`].
//!
//! Binding tags follow a small grammar:
//!
//! | Tag              | Meaning                                                  |
//! |------------------|----------------------------------------------------------|
//! | *(none)*         | key = field name in the current group                    |
//! | `"key"`          | key = `key` in the current group                         |
//! | `"group.key"`    | key = `key`; `group` becomes the current group           |
//! | `"name,group"`   | nested structure bound to group `name`                   |
//!
//! ```
//! use remote_config_client::decode::{decode, Decode, Field};
//! use remote_config_client::{ConfigDocument, Parameter, ValueType};
//!
//! #[derive(Default)]
//! struct Limits {
//!     max_connections: u32,
//! }
//!
//! impl Decode for Limits {
//!     fn fields(&mut self) -> Vec<Field<'_>> {
//!         vec![Field::new("max_connections", &mut self.max_connections).tag("limits.max")]
//!     }
//! }
//!
//! let mut document = ConfigDocument::default();
//! let mut group = remote_config_client::ParameterGroup::default();
//! group
//!     .parameters
//!     .insert("max".into(), Parameter::with_default(ValueType::Number, "64"));
//! document.parameter_groups.insert("limits".into(), group);
//!
//! let mut limits = Limits::default();
//! decode(&mut limits, &document).unwrap();
//! assert_eq!(limits.max_connections, 64);
//! ```

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::{ConfigDocument, Parameter, ValueType};

/// Maximum nesting depth of group bindings.
pub const MAX_DEPTH: usize = 100;

/// Option marking a tag as a nested group binding.
const GROUP_OPTION: &str = "group";

/// Errors raised while decoding a document into a target structure.
///
/// Decoding stops at the first error. Fields assigned before the failing one
/// keep their new values.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid decode target `{field}`: {reason}")]
    InvalidTarget { field: String, reason: String },
    #[error("decode target nests deeper than {max} levels at `{field}`")]
    TooDeep { field: String, max: usize },
    #[error("field `{field}` is bound to group `{group}` but is not a nested structure")]
    ExpectedGroupType { field: String, group: String },
    #[error("parameter group `{group}` not found (field `{field}`)")]
    GroupNotFound { field: String, group: String },
    #[error("parameter `{key}` not found in {} (field `{field}`)", scope(.group))]
    ParameterNotFound {
        field: String,
        group: String,
        key: String,
    },
    #[error("parameter `{key}` in {} has neither a default nor a conditional value (field `{field}`)", scope(.group))]
    UnresolvedParameter {
        field: String,
        group: String,
        key: String,
    },
    #[error("field `{field}` is a {expected} field but the parameter is declared as {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        actual: ValueType,
    },
    #[error("invalid {value_type} value {value:?} for field `{field}`: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        value_type: ValueType,
        reason: String,
    },
    #[error("parameter `{key}` for field `{field}` has an unspecified value type")]
    UnspecifiedType { field: String, key: String },
}

fn scope(group: &str) -> String {
    if group.is_empty() {
        "top-level parameters".to_string()
    } else {
        format!("group `{group}`")
    }
}

/// Kind of a target field, as reported by [`DecodeError::TypeMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Number,
    Json,
    Group,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Number => "numeric",
            FieldKind::Json => "json",
            FieldKind::Group => "group",
        };
        f.write_str(name)
    }
}

/// A structure whose fields can be populated from a [`ConfigDocument`].
pub trait Decode {
    /// Lists the fields of `self` with their bindings.
    fn fields(&mut self) -> Vec<Field<'_>>;
}

/// Targets for JSON-typed parameters.
///
/// Implemented for every deserializable type; the literal is parsed straight
/// into the field.
pub trait JsonTarget {
    fn load_json(&mut self, raw: &str) -> Result<(), serde_json::Error>;
}

impl<T: DeserializeOwned> JsonTarget for T {
    fn load_json(&mut self, raw: &str) -> Result<(), serde_json::Error> {
        *self = serde_json::from_str(raw)?;
        Ok(())
    }
}

/// Mutable handle to a numeric field.
pub enum NumberRef<'a> {
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    Usize(&'a mut usize),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    Isize(&'a mut isize),
    F32(&'a mut f32),
    F64(&'a mut f64),
}

/// Result of the numeric parse chain.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Number {
    /// Tries unsigned, then signed, then floating point.
    fn parse(raw: &str) -> Option<Self> {
        if let Ok(value) = raw.parse::<u64>() {
            return Some(Number::Unsigned(value));
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Some(Number::Signed(value));
        }
        raw.parse::<f64>().ok().map(Number::Float)
    }
}

macro_rules! assign_number {
    ($slot:expr, $number:expr, $ty:ty) => {
        *$slot = match $number {
            Number::Unsigned(value) => value as $ty,
            Number::Signed(value) => value as $ty,
            Number::Float(value) => value as $ty,
        }
    };
}

impl NumberRef<'_> {
    fn assign(self, number: Number) {
        match self {
            NumberRef::U8(slot) => assign_number!(slot, number, u8),
            NumberRef::U16(slot) => assign_number!(slot, number, u16),
            NumberRef::U32(slot) => assign_number!(slot, number, u32),
            NumberRef::U64(slot) => assign_number!(slot, number, u64),
            NumberRef::Usize(slot) => assign_number!(slot, number, usize),
            NumberRef::I8(slot) => assign_number!(slot, number, i8),
            NumberRef::I16(slot) => assign_number!(slot, number, i16),
            NumberRef::I32(slot) => assign_number!(slot, number, i32),
            NumberRef::I64(slot) => assign_number!(slot, number, i64),
            NumberRef::Isize(slot) => assign_number!(slot, number, isize),
            NumberRef::F32(slot) => assign_number!(slot, number, f32),
            NumberRef::F64(slot) => assign_number!(slot, number, f64),
        }
    }
}

/// Typed mutable handle to a field of a target structure.
pub enum FieldRef<'a> {
    Str(&'a mut String),
    Bool(&'a mut bool),
    Number(NumberRef<'a>),
    Json(&'a mut dyn JsonTarget),
    Group(&'a mut dyn Decode),
}

impl FieldRef<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldRef::Str(_) => FieldKind::String,
            FieldRef::Bool(_) => FieldKind::Bool,
            FieldRef::Number(_) => FieldKind::Number,
            FieldRef::Json(_) => FieldKind::Json,
            FieldRef::Group(_) => FieldKind::Group,
        }
    }
}

impl<'a> From<&'a mut String> for FieldRef<'a> {
    fn from(value: &'a mut String) -> Self {
        FieldRef::Str(value)
    }
}

impl<'a> From<&'a mut bool> for FieldRef<'a> {
    fn from(value: &'a mut bool) -> Self {
        FieldRef::Bool(value)
    }
}

macro_rules! number_field_ref {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a mut $ty> for FieldRef<'a> {
                fn from(value: &'a mut $ty) -> Self {
                    FieldRef::Number(NumberRef::$variant(value))
                }
            }
        )*
    };
}

number_field_ref!(
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize,
    f32 => F32, f64 => F64,
);

/// A field of a target structure together with its binding metadata.
pub struct Field<'a> {
    name: &'static str,
    tag: Option<&'static str>,
    /// Set by [`Field::group`]: `tag` holds a bare group name.
    group_binding: bool,
    target: FieldRef<'a>,
}

impl<'a> Field<'a> {
    /// Binds a string, boolean or numeric field.
    pub fn new(name: &'static str, target: impl Into<FieldRef<'a>>) -> Self {
        Self {
            name,
            tag: None,
            group_binding: false,
            target: target.into(),
        }
    }

    /// Binds a field that receives a JSON-typed parameter.
    pub fn json(name: &'static str, target: &'a mut dyn JsonTarget) -> Self {
        Self {
            name,
            tag: None,
            group_binding: false,
            target: FieldRef::Json(target),
        }
    }

    /// Declares a nested structure. It must be tagged `"<name>,group"`.
    pub fn nested(name: &'static str, target: &'a mut dyn Decode) -> Self {
        Self {
            name,
            tag: None,
            group_binding: false,
            target: FieldRef::Group(target),
        }
    }

    /// Binds a nested structure to the parameter group `group`.
    ///
    /// Equivalent to `Field::nested(name, target).tag("<group>,group")`.
    pub fn group(name: &'static str, group: &'static str, target: &'a mut dyn Decode) -> Self {
        Self {
            name,
            tag: Some(group),
            group_binding: true,
            target: FieldRef::Group(target),
        }
    }

    /// Sets the raw binding tag (`"key"`, `"group.key"` or `"name,group"`).
    pub fn tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self.group_binding = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.target.kind()
    }
}

/// Parsed binding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding<'t> {
    /// Leaf field; `group` overrides the enclosing group when set.
    Key { group: Option<&'t str>, key: &'t str },
    /// Nested structure bound to a group.
    Group(&'t str),
}

fn parse_tag<'t>(field: &str, tag: &'t str) -> Result<Binding<'t>, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidTarget {
        field: field.to_string(),
        reason,
    };
    let mut tokens = tag.split(',');
    let name = tokens.next().unwrap_or_default().trim();
    let mut is_group = false;
    for option in tokens {
        match option.trim() {
            GROUP_OPTION => is_group = true,
            other => return Err(invalid(format!("unknown binding option {other:?}"))),
        }
    }
    if name.is_empty() {
        return Err(invalid(format!("binding tag {tag:?} has no name")));
    }
    if is_group {
        if name.contains('.') {
            return Err(invalid(format!("group name {name:?} cannot contain '.'")));
        }
        return Ok(Binding::Group(name));
    }
    match name.split_once('.') {
        Some((group, key)) if !group.is_empty() && !key.is_empty() && !key.contains('.') => {
            Ok(Binding::Key {
                group: Some(group),
                key,
            })
        }
        Some(_) => Err(invalid(format!(
            "binding tag {tag:?} must be \"key\" or \"group.key\""
        ))),
        None => Ok(Binding::Key {
            group: None,
            key: name,
        }),
    }
}

/// Populates `target` from `source`.
///
/// The document is only read. Parameters whose effective value is empty leave
/// the bound field untouched.
pub fn decode(target: &mut dyn Decode, source: &ConfigDocument) -> Result<(), DecodeError> {
    Decoder { source }.decode_struct(target, "", 0)
}

impl ConfigDocument {
    /// Populates `target` from this document. See [`decode`].
    pub fn decode_into(&self, target: &mut dyn Decode) -> Result<(), DecodeError> {
        decode(target, self)
    }
}

struct Decoder<'d> {
    source: &'d ConfigDocument,
}

impl Decoder<'_> {
    fn decode_struct(
        &self,
        target: &mut dyn Decode,
        group: &str,
        depth: usize,
    ) -> Result<(), DecodeError> {
        // A "group.key" tag moves the remaining sibling fields into that group.
        let mut current = group;
        for field in target.fields() {
            self.decode_field(field, &mut current, depth)?;
        }
        Ok(())
    }

    fn decode_field(
        &self,
        field: Field<'_>,
        current: &mut &str,
        depth: usize,
    ) -> Result<(), DecodeError> {
        let Field {
            name,
            tag,
            group_binding,
            target,
        } = field;
        let binding = match tag {
            Some(group) if group_binding => {
                if group.is_empty() || group.contains(['.', ',']) {
                    return Err(DecodeError::InvalidTarget {
                        field: name.to_string(),
                        reason: format!("invalid group name {group:?}"),
                    });
                }
                Binding::Group(group)
            }
            Some(tag) => parse_tag(name, tag)?,
            None => Binding::Key {
                group: None,
                key: name,
            },
        };

        let (group, key) = match binding {
            Binding::Group(group_name) => {
                let FieldRef::Group(nested) = target else {
                    return Err(DecodeError::ExpectedGroupType {
                        field: name.to_string(),
                        group: group_name.to_string(),
                    });
                };
                if depth + 1 > MAX_DEPTH {
                    return Err(DecodeError::TooDeep {
                        field: name.to_string(),
                        max: MAX_DEPTH,
                    });
                }
                return self.decode_struct(nested, group_name, depth + 1);
            }
            Binding::Key {
                group: Some(explicit),
                key,
            } => {
                *current = explicit;
                (explicit, key)
            }
            Binding::Key { group: None, key } => (*current, key),
        };

        if let FieldRef::Group(_) = target {
            return Err(DecodeError::InvalidTarget {
                field: name.to_string(),
                reason: "nested structures must be bound with a \"<name>,group\" tag".to_string(),
            });
        }

        let parameter = self.lookup(name, group, key)?;
        let Some((raw, value_type)) = parameter.resolve() else {
            return Err(DecodeError::UnresolvedParameter {
                field: name.to_string(),
                group: group.to_string(),
                key: key.to_string(),
            });
        };
        if raw.is_empty() {
            return Ok(());
        }
        assign(name, key, target, raw, value_type)
    }

    fn lookup(&self, field: &str, group: &str, key: &str) -> Result<&Parameter, DecodeError> {
        match self.source.group_parameter(group, key) {
            None => Err(DecodeError::GroupNotFound {
                field: field.to_string(),
                group: group.to_string(),
            }),
            Some(None) => Err(DecodeError::ParameterNotFound {
                field: field.to_string(),
                group: group.to_string(),
                key: key.to_string(),
            }),
            Some(Some(parameter)) => Ok(parameter),
        }
    }
}

fn assign(
    field: &str,
    key: &str,
    target: FieldRef<'_>,
    raw: &str,
    value_type: ValueType,
) -> Result<(), DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        value_type,
        reason,
    };
    let mismatch = |expected: FieldKind| DecodeError::TypeMismatch {
        field: field.to_string(),
        expected,
        actual: value_type,
    };

    match (value_type, target) {
        (ValueType::Unspecified, _) => Err(DecodeError::UnspecifiedType {
            field: field.to_string(),
            key: key.to_string(),
        }),
        (ValueType::String, FieldRef::Str(slot)) => {
            raw.clone_into(slot);
            Ok(())
        }
        (ValueType::Boolean, FieldRef::Bool(slot)) => {
            *slot = match raw {
                "true" => true,
                "false" => false,
                _ => return Err(invalid("expected \"true\" or \"false\"".to_string())),
            };
            Ok(())
        }
        (ValueType::Number, FieldRef::Number(slot)) => {
            let number = Number::parse(raw).ok_or_else(|| invalid("not a number".to_string()))?;
            slot.assign(number);
            Ok(())
        }
        (ValueType::Json, FieldRef::Json(slot)) => slot
            .load_json(raw)
            .map_err(|err| invalid(err.to_string())),
        (_, target) => Err(mismatch(target.kind())),
    }
}
