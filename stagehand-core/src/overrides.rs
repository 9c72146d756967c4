//! Site administrator overrides, layered over registry defaults.
//!
//! The store never touches definitions: an override is an entry in a second
//! map, and "restore the default" is just removing that entry. Validation
//! happens against the paired registry at set time, so a stored override is
//! always well-typed for its definition.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::registry::PropertyRegistry;
use crate::types::{PropertyName, PropertyValue};

/// Explicit per-installation overrides for registered properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideStore {
    entries: BTreeMap<PropertyName, PropertyValue>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an override for a registered property.
    ///
    /// Fails with [`CoreError::UnknownProperty`] when no definition exists
    /// and [`CoreError::TypeMismatch`] when the value does not conform to the
    /// definition's declared type. The store is unchanged on error.
    pub fn set(
        &mut self,
        registry: &PropertyRegistry,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), CoreError> {
        let definition = registry.get(name)?;
        if !definition.property_type.conforms(&value) {
            return Err(CoreError::TypeMismatch {
                name: definition.name.clone(),
                expected: definition.property_type.clone(),
                value: value.to_string(),
            });
        }
        self.entries.insert(definition.name.clone(), value);
        Ok(())
    }

    /// Parse a raw administrator string through the definition's type, then
    /// set it. Returns the parsed value so callers can echo it back.
    pub fn set_str(
        &mut self,
        registry: &PropertyRegistry,
        name: &str,
        raw: &str,
    ) -> Result<PropertyValue, CoreError> {
        let definition = registry.get(name)?;
        let value = definition.property_type.parse(raw).ok_or_else(|| {
            CoreError::TypeMismatch {
                name: definition.name.clone(),
                expected: definition.property_type.clone(),
                value: raw.to_owned(),
            }
        })?;
        self.entries.insert(definition.name.clone(), value.clone());
        Ok(value)
    }

    /// Remove an override, reverting the property to its registry default.
    ///
    /// Idempotent: unsetting a name with no override is a no-op. Returns
    /// whether an override was actually removed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// The override for `name`, or `None` when the default applies.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyName, &PropertyValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild a store from a persisted string map.
    ///
    /// Entries for unknown names or with unparseable values become warnings
    /// instead of errors — a stale override file must not brick the tool.
    /// Skipped entries are dropped on the next save.
    pub fn from_saved(
        registry: &PropertyRegistry,
        saved: &BTreeMap<String, String>,
    ) -> (Self, Vec<String>) {
        let mut store = Self::new();
        let mut warnings = Vec::new();
        for (name, raw) in saved {
            match store.set_str(registry, name, raw) {
                Ok(_) => {}
                Err(err) => warnings.push(format!("ignoring saved override: {err}")),
            }
        }
        (store, warnings)
    }

    /// The persistable string form of every override.
    pub fn to_saved(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(name, value)| (name.0.clone(), value.to_string()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PropertyDefinition;
    use crate::types::PropertyType;

    fn registry() -> PropertyRegistry {
        let mut registry = PropertyRegistry::new();
        registry
            .register(PropertyDefinition::new("main.port", 8080))
            .expect("register port");
        registry
            .register(PropertyDefinition::new("main.host", "localhost"))
            .expect("register host");
        registry
            .register(
                PropertyDefinition::new("cache.mode", "small")
                    .with_type(PropertyType::Enum(vec!["small".into(), "large".into()])),
            )
            .expect("register mode");
        registry
    }

    #[test]
    fn set_then_get_roundtrip() {
        let registry = registry();
        let mut store = OverrideStore::new();
        store
            .set(&registry, "main.port", PropertyValue::Int(9090))
            .expect("set");
        assert_eq!(store.get("main.port"), Some(&PropertyValue::Int(9090)));
    }

    #[test]
    fn unset_reverts_to_no_override_and_is_idempotent() {
        let registry = registry();
        let mut store = OverrideStore::new();
        store
            .set(&registry, "main.port", PropertyValue::Int(9090))
            .expect("set");
        assert!(store.unset("main.port"));
        assert_eq!(store.get("main.port"), None);
        assert!(!store.unset("main.port"), "second unset is a quiet no-op");
        assert!(!store.unset("never.set"));
    }

    #[test]
    fn set_unknown_property_is_rejected() {
        let registry = registry();
        let mut store = OverrideStore::new();
        let err = store
            .set(&registry, "main.protx", PropertyValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn set_mismatched_type_is_rejected() {
        let registry = registry();
        let mut store = OverrideStore::new();
        let err = store
            .set(&registry, "main.port", PropertyValue::from("eighty"))
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn set_str_parses_through_declared_type() {
        let registry = registry();
        let mut store = OverrideStore::new();
        let parsed = store.set_str(&registry, "main.port", "9090").expect("set_str");
        assert_eq!(parsed, PropertyValue::Int(9090));
        let err = store.set_str(&registry, "cache.mode", "medium").unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn saved_roundtrip_with_lenient_load() {
        let registry = registry();
        let mut store = OverrideStore::new();
        store.set_str(&registry, "main.port", "9090").expect("set port");
        store.set_str(&registry, "cache.mode", "large").expect("set mode");

        let mut saved = store.to_saved();
        saved.insert("ghost.key".into(), "x".into());
        saved.insert("main.port2".into(), "1".into());

        let (loaded, warnings) = OverrideStore::from_saved(&registry, &saved);
        assert_eq!(loaded.get("main.port"), Some(&PropertyValue::Int(9090)));
        assert_eq!(loaded.get("cache.mode"), Some(&PropertyValue::from("large")));
        assert_eq!(loaded.len(), 2, "unknown keys are skipped, not stored");
        assert_eq!(warnings.len(), 2);
    }
}
