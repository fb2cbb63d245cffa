//! Field filters evaluated both by the API server and locally.

use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::Resource;
use std::fmt;

/// Object field a watch is scoped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// `spec.nodeName` of a pod
    NodeName,
    /// `metadata.name` of any object
    ObjectName,
}

impl FilterField {
    /// Field path understood by the API server's field selector
    pub fn path(self) -> &'static str {
        match self {
            Self::NodeName => "spec.nodeName",
            Self::ObjectName => "metadata.name",
        }
    }
}

/// Objects a [`FieldFilter`] can be evaluated against
pub trait FilterTarget: Resource {
    /// Node the object is bound to, for kinds that have one
    fn node_name(&self) -> Option<&str> {
        None
    }
}

impl FilterTarget for Pod {
    fn node_name(&self) -> Option<&str> {
        self.spec.as_ref()?.node_name.as_deref()
    }
}

impl FilterTarget for Secret {}

/// Equality filter on a single field
///
/// The same value produces the server-side field selector and the local
/// predicate, so the two can never disagree. A field that is absent on an
/// object compares as the empty string, matching API server semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    field: FilterField,
    value: String,
}

impl FieldFilter {
    pub fn new(field: FilterField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// Pods scheduled on the given node
    pub fn node_name(node: impl Into<String>) -> Self {
        Self::new(FilterField::NodeName, node)
    }

    /// The single object with the given name
    pub fn object_name(name: impl Into<String>) -> Self {
        Self::new(FilterField::ObjectName, name)
    }

    pub fn field(&self) -> FilterField {
        self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Render as a field selector, e.g. `spec.nodeName=node-7`
    pub fn field_selector(&self) -> String {
        format!("{}={}", self.field.path(), self.value)
    }

    pub fn matches<K: FilterTarget>(&self, object: &K) -> bool {
        let actual = match self.field {
            FilterField::NodeName => object.node_name(),
            FilterField::ObjectName => object.meta().name.as_deref(),
        };
        actual.unwrap_or_default() == self.value
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_selector())
    }
}
