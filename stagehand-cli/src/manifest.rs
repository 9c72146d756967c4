//! The YAML manifest: property declarations, service descriptors, settings.
//!
//! The manifest is the packager's build artifact. Loading it is the
//! write-once registration step: every property definition and service
//! descriptor is created here, and nothing mutates them afterwards. Hook
//! fields name built-ins from [`crate::hooks`]; an unresolvable name fails
//! the load.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use stagehand_core::{
    PropertyDefinition, PropertyRegistry, PropertyType, PropertyValue, ReadinessStrategy,
    ServiceDescriptor,
};

use crate::hooks;

/// Read and parse a manifest file.
pub fn load(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read manifest {}", path.display()))?;
    let manifest: Manifest = serde_yaml::from_str(&text)
        .with_context(|| format!("could not parse manifest {}", path.display()))?;
    Ok(manifest)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub settings: Settings,
}

/// One `properties:` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    pub name: String,
    pub default: PropertyValue,
    /// Declared type; inferred from the default when omitted.
    #[serde(rename = "type", default)]
    pub type_name: Option<TypeName>,
    /// Allowed values for enum-typed properties; implies `type: enum`.
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub doc: Option<String>,
    /// Name of a built-in derivation hook.
    #[serde(default)]
    pub derive: Option<String>,
    /// Name of a built-in validation hook.
    #[serde(default)]
    pub validate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeName {
    Str,
    Int,
    Bool,
    Enum,
}

/// One `services:` entry. Command, cwd, env values, and the pidfile path are
/// templates that may reference properties with `{{ dotted.name }}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub readiness: ReadinessSpec,
    #[serde(default)]
    pub ready_timeout_secs: Option<u64>,
    #[serde(default)]
    pub stop_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadinessSpec {
    /// Every declared port accepts a TCP connection (vacuously ready with no
    /// ports).
    #[default]
    Tcp,
    /// A pidfile exists at the rendered path.
    Pidfile { path: String },
    /// A named built-in probe says so.
    Probe { name: String },
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Overrides file, relative to the manifest directory.
    pub overrides_file: String,
    /// Supervisor state directory; may reference properties.
    pub state_dir: String,
    pub ready_timeout_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overrides_file: "overrides.props".into(),
            state_dir: ".stagehand".into(),
            ready_timeout_secs: 15,
            stop_grace_secs: 10,
        }
    }
}

impl Manifest {
    /// Register every declared property, in manifest order.
    pub fn build_registry(&self) -> Result<PropertyRegistry> {
        let mut registry = PropertyRegistry::new();
        for spec in &self.properties {
            let mut definition = PropertyDefinition::new(spec.name.as_str(), spec.default.clone());
            if let Some(property_type) = spec.declared_type()? {
                definition = definition.with_type(property_type);
            }
            if let Some(doc) = &spec.doc {
                definition = definition.with_doc(doc.clone());
            }
            if let Some(hook) = &spec.derive {
                let derive = hooks::derive_fn(hook).with_context(|| {
                    format!("property `{}`: unknown derive hook `{hook}`", spec.name)
                })?;
                definition = definition.with_derive(derive);
            }
            if let Some(hook) = &spec.validate {
                let validate = hooks::validate_fn(hook).with_context(|| {
                    format!("property `{}`: unknown validate hook `{hook}`", spec.name)
                })?;
                definition = definition.with_validate(validate);
            }
            registry
                .register(definition)
                .with_context(|| format!("property `{}`", spec.name))?;
        }
        Ok(registry)
    }

    /// Build descriptors for every declared service, in manifest order.
    pub fn build_services(&self) -> Result<Vec<ServiceDescriptor>> {
        let mut seen = BTreeSet::new();
        let mut services = Vec::with_capacity(self.services.len());
        for spec in &self.services {
            if !seen.insert(spec.name.as_str()) {
                bail!("service `{}` is declared twice", spec.name);
            }
            if spec.command.is_empty() {
                bail!("service `{}` has an empty command", spec.name);
            }
            let readiness = match &spec.readiness {
                ReadinessSpec::Tcp => ReadinessStrategy::TcpPorts,
                ReadinessSpec::Pidfile { path } => ReadinessStrategy::PidFile { path: path.clone() },
                ReadinessSpec::Probe { name } => {
                    let probe = hooks::probe_fn(name).with_context(|| {
                        format!("service `{}`: unknown readiness probe `{name}`", spec.name)
                    })?;
                    ReadinessStrategy::Custom {
                        name: name.clone(),
                        probe,
                    }
                }
            };
            let mut descriptor = ServiceDescriptor::new(spec.name.as_str(), spec.command.clone());
            descriptor.cwd = spec.cwd.clone();
            descriptor.env = spec.env.clone();
            descriptor.ports = spec.ports.clone();
            descriptor.readiness = readiness;
            descriptor.ready_timeout = spec.ready_timeout_secs.map(Duration::from_secs);
            descriptor.stop_grace = spec.stop_grace_secs.map(Duration::from_secs);
            services.push(descriptor);
        }
        Ok(services)
    }
}

impl PropertySpec {
    /// The explicitly declared type, if any. A non-empty `allowed` list means
    /// enum whether or not `type: enum` was spelled out.
    fn declared_type(&self) -> Result<Option<PropertyType>> {
        match (self.type_name, self.allowed.is_empty()) {
            (None, true) => Ok(None),
            (None, false) | (Some(TypeName::Enum), false) => {
                Ok(Some(PropertyType::Enum(self.allowed.clone())))
            }
            (Some(TypeName::Enum), true) => {
                bail!("property `{}`: enum type needs an `allowed` list", self.name)
            }
            (Some(TypeName::Str), true) => Ok(Some(PropertyType::Str)),
            (Some(TypeName::Int), true) => Ok(Some(PropertyType::Int)),
            (Some(TypeName::Bool), true) => Ok(Some(PropertyType::Bool)),
            (Some(_), false) => {
                bail!("property `{}`: `allowed` requires `type: enum`", self.name)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
