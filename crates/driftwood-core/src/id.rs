//! Resource identifier codec
//!
//! Identifiers are ARM resource paths:
//!
//! ```text
//! /subscriptions/{subscription}/resourceGroups/{group}
//! /subscriptions/{subscription}/resourceGroups/{group}/providers/{namespace}/{type}/{name}[/{childType}/{childName}]...
//! ```
//!
//! Composite identifiers join two paths with a single `|`. The encoded form
//! is persisted in state files, so it must never change shape.

use crate::error::{ReconcileError, Result};
use std::fmt;
use std::str::FromStr;

/// Separator between the halves of a composite identifier
pub const COMPOSITE_SEPARATOR: char = '|';

/// A typed identifier persisted as one opaque string
pub trait ResourceIdentifier: Sized + Clone + PartialEq + fmt::Debug + Send + Sync {
    fn encode(&self) -> String;

    fn decode(id: &str) -> Result<Self>;
}

/// Parsed ARM resource path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    subscription_id: String,
    resource_group: String,
    namespace: Option<String>,
    segments: Vec<(String, String)>,
}

fn check_value(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value.contains(COMPOSITE_SEPARATOR) {
        return Err(ReconcileError::InvalidConfig(format!(
            "{field} must be non-empty and must not contain '/' or '|': {value:?}"
        )));
    }
    Ok(())
}

impl ResourcePath {
    /// `/subscriptions/{subscription}/resourceGroups/{group}`
    pub fn resource_group(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Result<Self> {
        let subscription_id = subscription_id.into();
        let resource_group = resource_group.into();
        check_value("subscription ID", &subscription_id)?;
        check_value("resource group name", &resource_group)?;
        Ok(Self {
            subscription_id,
            resource_group,
            namespace: None,
            segments: Vec::new(),
        })
    }

    /// A top-level resource inside a resource group
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        namespace: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let mut path = Self::resource_group(subscription_id, resource_group)?;
        let namespace = namespace.into();
        check_value("provider namespace", &namespace)?;
        path.namespace = Some(namespace);
        path.push(resource_type.into(), name.into())?;
        Ok(path)
    }

    /// A nested resource below this one
    pub fn child(&self, resource_type: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        if self.namespace.is_none() {
            return Err(ReconcileError::InvalidConfig(format!(
                "{self} has no provider namespace and cannot have child resources"
            )));
        }
        let mut path = self.clone();
        path.push(resource_type.into(), name.into())?;
        Ok(path)
    }

    fn push(&mut self, resource_type: String, name: String) -> Result<()> {
        check_value("resource type", &resource_type)?;
        check_value("resource name", &name)?;
        self.segments.push((resource_type, name));
        Ok(())
    }

    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || ReconcileError::InvalidId {
            expected: "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroup}[/providers/{namespace}/{type}/{name}...]".to_string(),
            got: input.to_string(),
        };

        let body = input.strip_prefix('/').ok_or_else(invalid)?;
        let parts: Vec<&str> = body.split('/').collect();
        if parts.len() < 4 || parts.len() % 2 != 0 {
            return Err(invalid());
        }
        if parts.iter().any(|p| p.is_empty() || p.contains(COMPOSITE_SEPARATOR)) {
            return Err(invalid());
        }
        if !parts[0].eq_ignore_ascii_case("subscriptions")
            || !parts[2].eq_ignore_ascii_case("resourceGroups")
        {
            return Err(invalid());
        }

        let mut path = Self {
            subscription_id: parts[1].to_string(),
            resource_group: parts[3].to_string(),
            namespace: None,
            segments: Vec::new(),
        };
        if parts.len() == 4 {
            return Ok(path);
        }

        if parts.len() < 8 || !parts[4].eq_ignore_ascii_case("providers") {
            return Err(invalid());
        }
        path.namespace = Some(parts[5].to_string());
        path.segments = parts[6..]
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        Ok(path)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }

    /// Name of the innermost object (the resource group for group paths)
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or(&self.resource_group)
    }

    /// Value of a segment, matching its type case-insensitively
    pub fn get(&self, resource_type: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(resource_type))
            .map(|(_, value)| value.as_str())
    }

    /// Path of the enclosing object, `None` for a resource group
    pub fn parent(&self) -> Option<Self> {
        match self.segments.len() {
            0 => None,
            1 => Some(Self {
                namespace: None,
                segments: Vec::new(),
                ..self.clone()
            }),
            n => {
                let mut parent = self.clone();
                parent.segments.truncate(n - 1);
                Some(parent)
            }
        }
    }

    /// Ensure the segment types are exactly `expected`, in order
    pub fn expect_shape(&self, namespace: &str, expected: &[&str]) -> Result<()> {
        let namespace_ok = match &self.namespace {
            Some(actual) => actual.eq_ignore_ascii_case(namespace),
            None => expected.is_empty(),
        };
        let segments_ok = self.segments.len() == expected.len()
            && self
                .segments
                .iter()
                .zip(expected)
                .all(|((key, _), want)| key.eq_ignore_ascii_case(want));

        if namespace_ok && segments_ok {
            return Ok(());
        }

        let mut shape = String::from("/subscriptions/{subscriptionId}/resourceGroups/{resourceGroup}");
        if !expected.is_empty() {
            shape.push_str(&format!("/providers/{namespace}"));
            for segment in expected {
                shape.push_str(&format!("/{segment}/{{name}}"));
            }
        }
        Err(ReconcileError::InvalidId {
            expected: shape,
            got: self.to_string(),
        })
    }
}

impl ResourcePath {
    /// Check the shape like [`ResourcePath::expect_shape`], then re-emit the
    /// namespace and segment types in the casing given by `expected`
    pub fn into_shape(mut self, namespace: &str, expected: &[&str]) -> Result<Self> {
        self.expect_shape(namespace, expected)?;
        if !expected.is_empty() {
            self.namespace = Some(namespace.to_string());
        }
        for ((key, _), want) in self.segments.iter_mut().zip(expected) {
            *key = (*want).to_string();
        }
        Ok(self)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )?;
        if let Some(namespace) = &self.namespace {
            write!(f, "/providers/{namespace}")?;
            for (key, value) in &self.segments {
                write!(f, "/{key}/{value}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ResourcePath {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl ResourceIdentifier for ResourcePath {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(id: &str) -> Result<Self> {
        Self::parse(id)
    }
}

/// Split a composite identifier into its two halves
pub fn split_composite<'a>(id: &'a str, expected: &str) -> Result<(&'a str, &'a str)> {
    let mut parts = id.split(COMPOSITE_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(left), Some(right), None) if !left.is_empty() && !right.is_empty() => {
            Ok((left, right))
        }
        _ => Err(ReconcileError::InvalidId {
            expected: expected.to_string(),
            got: id.to_string(),
        }),
    }
}

/// Join two halves into a composite identifier
pub fn join_composite(left: &str, right: &str) -> String {
    format!("{left}{COMPOSITE_SEPARATOR}{right}")
}
