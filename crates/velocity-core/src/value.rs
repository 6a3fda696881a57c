// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host value model.
//!
//! Module exports in the host are dynamic objects. `ExportValue` models the
//! parts the engine inspects: functions carry their stringified source so
//! they can be fingerprinted, objects carry named members and the
//! constructor display name singleton stores register under.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::VelocityError;

/// Signature of a callable host function.
pub type NativeFn = dyn Fn(&[ExportValue]) -> Result<ExportValue, VelocityError> + Send + Sync;

/// A host function together with its stringified source.
#[derive(Clone)]
pub struct HostFunction {
    source: Arc<str>,
    body: Arc<NativeFn>,
}

impl HostFunction {
    /// Wrap a callable with the source text the host would print for it.
    pub fn new<F>(source: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(&[ExportValue]) -> Result<ExportValue, VelocityError> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            body: Arc::new(body),
        }
    }

    /// A function that ignores its arguments and returns `value`.
    pub fn returning(source: impl Into<Arc<str>>, value: ExportValue) -> Self {
        Self::new(source, move |_| Ok(value.clone()))
    }

    /// The stringified source of the function.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Invoke the function.
    pub fn call(&self, args: &[ExportValue]) -> Result<ExportValue, VelocityError> {
        (self.body)(args)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.source.chars().take(48).collect();
        f.debug_struct("HostFunction")
            .field("source", &preview)
            .finish()
    }
}

#[derive(Debug, Default)]
struct ObjectInner {
    display_name: Option<String>,
    members: BTreeMap<String, ExportValue>,
}

/// An immutable host object with named members.
///
/// Cloning shares the underlying object, so two clones are the same export.
#[derive(Clone, Default)]
pub struct HostObject {
    inner: Arc<ObjectInner>,
}

impl HostObject {
    /// Start building an object.
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }

    /// The constructor display name, if the host set one.
    pub fn display_name(&self) -> Option<&str> {
        self.inner.display_name.as_deref()
    }

    /// Look up a member.
    pub fn get(&self, name: &str) -> Option<&ExportValue> {
        self.inner.members.get(name)
    }

    /// Returns true if `name` is an enumerable member.
    pub fn has(&self, name: &str) -> bool {
        self.inner.members.contains_key(name)
    }

    /// Member names in a stable order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.members.keys().map(String::as_str)
    }

    /// Members in a stable order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &ExportValue)> {
        self.inner.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("display_name", &self.inner.display_name)
            .field("members", &self.inner.members.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`HostObject`].
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    display_name: Option<String>,
    members: BTreeMap<String, ExportValue>,
}

impl ObjectBuilder {
    /// Set the constructor display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Add or replace a member.
    pub fn member(mut self, name: impl Into<String>, value: impl Into<ExportValue>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }

    /// Add a function member.
    pub fn function<F>(self, name: impl Into<String>, source: &str, body: F) -> Self
    where
        F: Fn(&[ExportValue]) -> Result<ExportValue, VelocityError> + Send + Sync + 'static,
    {
        self.member(name, HostFunction::new(source, body))
    }

    pub fn build(self) -> HostObject {
        HostObject {
            inner: Arc::new(ObjectInner {
                display_name: self.display_name,
                members: self.members,
            }),
        }
    }
}

/// A value exported by a host module.
#[derive(Clone, Debug, Default)]
pub enum ExportValue {
    /// The module exported nothing (or the value was `undefined`).
    #[default]
    Undefined,
    /// Strings, numbers, booleans, null and plain data.
    Primitive(serde_json::Value),
    Function(HostFunction),
    Object(HostObject),
}

impl ExportValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ExportValue::Undefined)
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            ExportValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            ExportValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExportValue::Primitive(v) => v.as_str(),
            _ => None,
        }
    }

    /// Member lookup; only objects have members.
    pub fn get(&self, name: &str) -> Option<&ExportValue> {
        self.as_object().and_then(|o| o.get(name))
    }

    /// Call this value as a function.
    pub fn call(&self, args: &[ExportValue]) -> Result<ExportValue, VelocityError> {
        match self {
            ExportValue::Function(f) => f.call(args),
            other => Err(VelocityError::HostShape {
                name: other.describe(),
                member: "call".into(),
            }),
        }
    }

    /// Call the function stored under `name`.
    pub fn call_method(&self, name: &str, args: &[ExportValue]) -> Result<ExportValue, VelocityError> {
        match self.get(name) {
            Some(ExportValue::Function(f)) => f.call(args),
            _ => Err(VelocityError::HostShape {
                name: self.describe(),
                member: name.to_string(),
            }),
        }
    }

    /// Identity for functions and objects, equality for primitives.
    pub fn same_value(&self, other: &ExportValue) -> bool {
        match (self, other) {
            (ExportValue::Undefined, ExportValue::Undefined) => true,
            (ExportValue::Primitive(a), ExportValue::Primitive(b)) => a == b,
            (ExportValue::Function(a), ExportValue::Function(b)) => a.ptr_eq(b),
            (ExportValue::Object(a), ExportValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Short human label used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            ExportValue::Undefined => "undefined".into(),
            ExportValue::Primitive(v) => format!("primitive {v}"),
            ExportValue::Function(_) => "function".into(),
            ExportValue::Object(o) => match o.display_name() {
                Some(name) => name.to_string(),
                None => "object".into(),
            },
        }
    }
}

impl From<HostFunction> for ExportValue {
    fn from(f: HostFunction) -> Self {
        ExportValue::Function(f)
    }
}

impl From<HostObject> for ExportValue {
    fn from(o: HostObject) -> Self {
        ExportValue::Object(o)
    }
}

impl From<serde_json::Value> for ExportValue {
    fn from(v: serde_json::Value) -> Self {
        ExportValue::Primitive(v)
    }
}

impl From<&str> for ExportValue {
    fn from(s: &str) -> Self {
        ExportValue::Primitive(serde_json::Value::String(s.to_string()))
    }
}

impl From<String> for ExportValue {
    fn from(s: String) -> Self {
        ExportValue::Primitive(serde_json::Value::String(s))
    }
}
