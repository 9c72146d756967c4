//! Domain types for the stagehand property and service model.
//!
//! Property values are typed scalars; `PropertyValue` serializes untagged so
//! JSON/YAML output shows the bare value, not an enum wrapper.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hooks::ProbeFn;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a declared startup property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyName(pub String);

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PropertyName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PropertyName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for PropertyName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PropertyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A strongly-typed name for a supervised service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Property values and types
// ---------------------------------------------------------------------------

/// A typed property value.
///
/// Enum-typed properties carry their value as `Str`; the allowed set lives on
/// the definition's [`PropertyType::Enum`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => s.fmt(f),
            PropertyValue::Int(n) => n.fmt(f),
            PropertyValue::Bool(b) => b.fmt(f),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Int(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// The declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Str,
    Int,
    Bool,
    /// A string constrained to a fixed set of allowed values.
    Enum(Vec<String>),
}

impl PropertyType {
    /// Whether `value` conforms to this type.
    pub fn conforms(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (PropertyType::Str, PropertyValue::Str(_)) => true,
            (PropertyType::Int, PropertyValue::Int(_)) => true,
            (PropertyType::Bool, PropertyValue::Bool(_)) => true,
            (PropertyType::Enum(allowed), PropertyValue::Str(s)) => {
                allowed.iter().any(|a| a == s)
            }
            _ => false,
        }
    }

    /// Parse a raw administrator-supplied string into a typed value.
    ///
    /// Returns `None` when the string does not parse as this type; the caller
    /// owns the error (it knows the property name).
    pub fn parse(&self, raw: &str) -> Option<PropertyValue> {
        match self {
            PropertyType::Str => Some(PropertyValue::Str(raw.to_owned())),
            PropertyType::Int => raw.trim().parse::<i64>().ok().map(PropertyValue::Int),
            PropertyType::Bool => match raw.trim() {
                "true" => Some(PropertyValue::Bool(true)),
                "false" => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            PropertyType::Enum(allowed) => {
                if allowed.iter().any(|a| a == raw) {
                    Some(PropertyValue::Str(raw.to_owned()))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Str => write!(f, "a string"),
            PropertyType::Int => write!(f, "an integer"),
            PropertyType::Bool => write!(f, "true|false"),
            PropertyType::Enum(allowed) => write!(f, "one of [{}]", allowed.join(", ")),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution output
// ---------------------------------------------------------------------------

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    Override,
    Derived,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::Override => write!(f, "override"),
            ValueSource::Derived => write!(f, "derived"),
        }
    }
}

/// A warning attached to a property during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub property: PropertyName,
    pub message: String,
    /// Fatal warnings are the packager's "do not start with this config".
    pub fatal: bool,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// The effective value of one property after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProperty {
    pub name: PropertyName,
    pub value: PropertyValue,
    pub source: ValueSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The full output of one resolver invocation.
///
/// Produced fresh on every resolve; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resolution {
    pub properties: BTreeMap<PropertyName, ResolvedProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// Look up one resolved property by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedProperty> {
        self.properties.get(name)
    }

    /// Look up just the effective value.
    pub fn value_of(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    /// The subset of warnings the packager marked fatal.
    pub fn fatal_warnings(&self) -> impl Iterator<Item = &ResolutionWarning> {
        self.warnings.iter().filter(|w| w.fatal)
    }

    pub fn has_fatal_warnings(&self) -> bool {
        self.warnings.iter().any(|w| w.fatal)
    }
}

// ---------------------------------------------------------------------------
// Service descriptors
// ---------------------------------------------------------------------------

/// How the supervisor decides a starting service has become Running.
#[derive(Clone)]
pub enum ReadinessStrategy {
    /// A PID file exists at the rendered path template.
    PidFile { path: String },
    /// Every declared port accepts a TCP connection.
    TcpPorts,
    /// A packager-supplied probe function, looked up by name.
    Custom { name: String, probe: ProbeFn },
}

impl fmt::Debug for ReadinessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStrategy::PidFile { path } => {
                f.debug_struct("PidFile").field("path", path).finish()
            }
            ReadinessStrategy::TcpPorts => write!(f, "TcpPorts"),
            ReadinessStrategy::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Packager-declared metadata for one supervised service.
///
/// `command`, `cwd`, `env` values, and the PID-file path are templates that
/// may reference resolved properties with `{{ dotted.name }}` spans.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: ServiceName,
    /// Argv template; element 0 is the executable.
    pub command: Vec<String>,
    pub cwd: Option<String>,
    /// Environment overlay templates, applied over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Declared listening ports, in packager order.
    pub ports: Vec<u16>,
    pub readiness: ReadinessStrategy,
    /// Per-service readiness budget; falls back to the supervisor default.
    pub ready_timeout: Option<Duration>,
    /// Per-service SIGTERM grace; falls back to the supervisor default.
    pub stop_grace: Option<Duration>,
}

impl ServiceDescriptor {
    /// A descriptor with no ports, TCP readiness (vacuously satisfied), and
    /// supervisor-default timeouts.
    pub fn new(name: impl Into<ServiceName>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            cwd: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            readiness: ReadinessStrategy::TcpPorts,
            ready_timeout: None,
            stop_grace: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn newtype_display() {
        assert_eq!(PropertyName::from("main.port").to_string(), "main.port");
        assert_eq!(ServiceName::from("search").to_string(), "search");
    }

    #[test]
    fn value_display_is_bare() {
        assert_eq!(PropertyValue::from("x").to_string(), "x");
        assert_eq!(PropertyValue::from(8080).to_string(), "8080");
        assert_eq!(PropertyValue::from(true).to_string(), "true");
    }

    #[test]
    fn value_serializes_untagged() {
        let json = serde_json::to_string(&PropertyValue::Int(9090)).expect("serialize");
        assert_eq!(json, "9090");
        let json = serde_json::to_string(&PropertyValue::from("a")).expect("serialize");
        assert_eq!(json, "\"a\"");
    }

    #[rstest]
    #[case(PropertyType::Str, "anything", Some(PropertyValue::from("anything")))]
    #[case(PropertyType::Int, "42", Some(PropertyValue::Int(42)))]
    #[case(PropertyType::Int, " 42 ", Some(PropertyValue::Int(42)))]
    #[case(PropertyType::Int, "4x", None)]
    #[case(PropertyType::Bool, "true", Some(PropertyValue::Bool(true)))]
    #[case(PropertyType::Bool, "yes", None)]
    fn parse_by_type(
        #[case] ty: PropertyType,
        #[case] raw: &str,
        #[case] expected: Option<PropertyValue>,
    ) {
        assert_eq!(ty.parse(raw), expected);
    }

    #[test]
    fn enum_parse_and_conform() {
        let ty = PropertyType::Enum(vec!["small".into(), "large".into()]);
        assert_eq!(ty.parse("small"), Some(PropertyValue::from("small")));
        assert_eq!(ty.parse("medium"), None);
        assert!(ty.conforms(&PropertyValue::from("large")));
        assert!(!ty.conforms(&PropertyValue::from("medium")));
        assert!(!ty.conforms(&PropertyValue::Int(1)));
    }

    #[test]
    fn resolution_lookup_by_str() {
        let mut resolution = Resolution::default();
        resolution.properties.insert(
            PropertyName::from("main.port"),
            ResolvedProperty {
                name: PropertyName::from("main.port"),
                value: PropertyValue::Int(8080),
                source: ValueSource::Default,
                warnings: vec![],
            },
        );
        assert_eq!(resolution.value_of("main.port"), Some(&PropertyValue::Int(8080)));
        assert!(resolution.get("main.host").is_none());
        assert!(!resolution.has_fatal_warnings());
    }
}
