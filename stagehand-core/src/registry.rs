//! Write-once registry of packager property definitions.
//!
//! Registration order is load-bearing: the resolver walks definitions in the
//! order the packager registered them, and hook reads may only reach
//! properties settled earlier in that walk.

use std::collections::HashMap;
use std::fmt;

use crate::error::CoreError;
use crate::hooks::{DeriveFn, ValidateFn};
use crate::types::{PropertyName, PropertyType, PropertyValue};

// ---------------------------------------------------------------------------
// Property definitions
// ---------------------------------------------------------------------------

/// A packager-declared property: default, type, and optional hooks.
///
/// Immutable once registered; a packager changing a default ships a new
/// registration at build time, not a runtime mutation.
#[derive(Clone)]
pub struct PropertyDefinition {
    pub name: PropertyName,
    pub default: PropertyValue,
    pub property_type: PropertyType,
    /// Packager documentation, shown by `show --verbose`.
    pub doc: Option<String>,
    pub derive: Option<DeriveFn>,
    pub validate: Option<ValidateFn>,
}

impl PropertyDefinition {
    /// A definition whose type is inferred from the default value.
    pub fn new(name: impl Into<PropertyName>, default: impl Into<PropertyValue>) -> Self {
        let default = default.into();
        let property_type = match &default {
            PropertyValue::Str(_) => PropertyType::Str,
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Bool(_) => PropertyType::Bool,
        };
        Self {
            name: name.into(),
            default,
            property_type,
            doc: None,
            derive: None,
            validate: None,
        }
    }

    /// Replace the inferred type (the enum type can never be inferred).
    pub fn with_type(mut self, property_type: PropertyType) -> Self {
        self.property_type = property_type;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_derive(mut self, derive: DeriveFn) -> Self {
        self.derive = Some(derive);
        self
    }

    pub fn with_validate(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("property_type", &self.property_type)
            .field("doc", &self.doc)
            .field("derive", &self.derive.as_ref().map(|_| "<fn>"))
            .field("validate", &self.validate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The packager's property registry. Write-once, registration-ordered.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    definitions: Vec<PropertyDefinition>,
    index: HashMap<PropertyName, usize>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// Fails with [`CoreError::DuplicateName`] if the name is taken, and with
    /// [`CoreError::TypeMismatch`] if the packager's own default does not
    /// conform to the declared type — both are build-time packager bugs that
    /// must abort loudly at startup.
    pub fn register(&mut self, definition: PropertyDefinition) -> Result<(), CoreError> {
        if self.index.contains_key(&definition.name) {
            return Err(CoreError::DuplicateName {
                name: definition.name.clone(),
            });
        }
        if !definition.property_type.conforms(&definition.default) {
            return Err(CoreError::TypeMismatch {
                name: definition.name.clone(),
                expected: definition.property_type.clone(),
                value: definition.default.to_string(),
            });
        }
        self.index
            .insert(definition.name.clone(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Result<&PropertyDefinition, CoreError> {
        self.index
            .get(name)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| CoreError::UnknownProperty {
                name: PropertyName::from(name),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get() {
        let mut registry = PropertyRegistry::new();
        registry
            .register(PropertyDefinition::new("main.port", 8080))
            .expect("register");
        let def = registry.get("main.port").expect("get");
        assert_eq!(def.default, PropertyValue::Int(8080));
        assert_eq!(def.property_type, PropertyType::Int);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PropertyRegistry::new();
        registry
            .register(PropertyDefinition::new("main.port", 8080))
            .expect("first register");
        let err = registry
            .register(PropertyDefinition::new("main.port", 9090))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateName { name } if name.0 == "main.port"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_property_is_an_error() {
        let registry = PropertyRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));
    }

    #[test]
    fn default_must_conform_to_declared_type() {
        let mut registry = PropertyRegistry::new();
        let def = PropertyDefinition::new("main.size", "huge")
            .with_type(PropertyType::Enum(vec!["small".into(), "large".into()]));
        let err = registry.register(def).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn definitions_iterate_in_registration_order() {
        let mut registry = PropertyRegistry::new();
        for name in ["c.third", "a.first", "b.second"] {
            registry
                .register(PropertyDefinition::new(name, "x"))
                .expect("register");
        }
        let names: Vec<&str> = registry.definitions().map(|d| d.name.0.as_str()).collect();
        assert_eq!(names, vec!["c.third", "a.first", "b.second"]);
    }

    #[test]
    fn inferred_types_match_defaults() {
        assert_eq!(
            PropertyDefinition::new("a", "s").property_type,
            PropertyType::Str
        );
        assert_eq!(
            PropertyDefinition::new("b", 1).property_type,
            PropertyType::Int
        );
        assert_eq!(
            PropertyDefinition::new("c", true).property_type,
            PropertyType::Bool
        );
    }
}
