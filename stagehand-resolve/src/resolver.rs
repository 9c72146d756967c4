//! Layered property resolution.
//!
//! Resolution runs in three stages:
//!
//! 1. **Layering** — every registered property gets its administrator
//!    override when one exists, otherwise its packaged default.
//! 2. **Interpolation** — string values may reference other properties
//!    with `{{ other.name }}` spans; references are substituted
//!    repeatedly until the map stops changing.
//! 3. **Hook walk** — definitions are visited in registration order.
//!    Derivations suggest values, validators vet them, and both report
//!    through warnings rather than aborting the run.

use std::collections::BTreeMap;

use stagehand_core::{
    Environment, HookContext, HookError, OverrideStore, PropertyDefinition, PropertyName,
    PropertyRegistry, PropertyValue, ResolvedProperty, Resolution, ResolutionWarning, ValueSource,
};
use stagehand_render::PropertyScope;

use crate::error::ResolveError;

/// Upper bound on interpolation passes before the run is declared cyclic.
pub const MAX_INTERPOLATION_PASSES: usize = 10;

/// Resolves every registered property against the given overrides and
/// host environment.
///
/// The returned [`Resolution`] always covers the full registry. Hook
/// complaints surface as warnings on it; only ordering violations and
/// unresolvable value templates abort the run.
pub fn resolve(
    registry: &PropertyRegistry,
    overrides: &OverrideStore,
    environment: &Environment,
) -> Result<Resolution, ResolveError> {
    let mut layered = layer(registry, overrides);
    interpolate(&mut layered)?;

    let mut settled: BTreeMap<PropertyName, ResolvedProperty> = BTreeMap::new();
    let mut warnings: Vec<ResolutionWarning> = Vec::new();

    for def in registry.definitions() {
        let (value, source) = match layered.remove(&def.name) {
            Some(entry) => entry,
            None => continue,
        };
        let resolved = settle(def, value, source, environment, &settled, &mut warnings)?;
        settled.insert(def.name.clone(), resolved);
    }

    tracing::debug!(
        "resolved {} properties with {} warnings",
        settled.len(),
        warnings.len()
    );
    Ok(Resolution {
        properties: settled,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Stage 1: layering
// ---------------------------------------------------------------------------

fn layer(
    registry: &PropertyRegistry,
    overrides: &OverrideStore,
) -> BTreeMap<PropertyName, (PropertyValue, ValueSource)> {
    let mut layered = BTreeMap::new();
    for def in registry.definitions() {
        let entry = match overrides.get(def.name.as_ref()) {
            Some(value) => (value.clone(), ValueSource::Override),
            None => (def.default.clone(), ValueSource::Default),
        };
        layered.insert(def.name.clone(), entry);
    }
    layered
}

// ---------------------------------------------------------------------------
// Stage 2: value interpolation
// ---------------------------------------------------------------------------

fn interpolate(
    values: &mut BTreeMap<PropertyName, (PropertyValue, ValueSource)>,
) -> Result<(), ResolveError> {
    for pass in 1..=MAX_INTERPOLATION_PASSES {
        let changes = render_pass(values)?;
        if changes.is_empty() {
            return Ok(());
        }
        tracing::debug!("interpolation pass {pass} rewrote {} values", changes.len());
        for (name, value) in changes {
            if let Some(entry) = values.get_mut(&name) {
                entry.0 = value;
            }
        }
    }

    // The map was still moving on the final pass. One more render tells a
    // long-but-finite chain apart from a genuine cycle.
    let stragglers = render_pass(values)?;
    if stragglers.is_empty() {
        return Ok(());
    }
    Err(ResolveError::InterpolationCycle {
        properties: stragglers.into_iter().map(|(name, _)| name).collect(),
    })
}

/// Renders every template-bearing string value once against the current
/// map and returns the entries that changed.
fn render_pass(
    values: &BTreeMap<PropertyName, (PropertyValue, ValueSource)>,
) -> Result<Vec<(PropertyName, PropertyValue)>, ResolveError> {
    let scope = PropertyScope::new(values.iter().map(|(name, (value, _))| (name, value)));
    let mut changes = Vec::new();
    for (name, (value, _)) in values {
        let text = match value {
            PropertyValue::Str(text) if text.contains("{{") => text,
            _ => continue,
        };
        let rendered = scope.render(text)?;
        if rendered != *text {
            changes.push((name.clone(), PropertyValue::Str(rendered)));
        }
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Stage 3: hook walk
// ---------------------------------------------------------------------------

fn settle(
    def: &PropertyDefinition,
    mut value: PropertyValue,
    mut source: ValueSource,
    environment: &Environment,
    settled: &BTreeMap<PropertyName, ResolvedProperty>,
    warnings: &mut Vec<ResolutionWarning>,
) -> Result<ResolvedProperty, ResolveError> {
    let mut local: Vec<String> = Vec::new();
    let mut warn = |message: String, fatal: bool| {
        local.push(message.clone());
        warnings.push(ResolutionWarning {
            property: def.name.clone(),
            message,
            fatal,
        });
    };

    if let Some(derive) = &def.derive {
        let ctx = HookContext::new(environment, settled);
        match derive(&ctx) {
            Ok(suggestion) if source == ValueSource::Override => {
                if suggestion != value {
                    warn(
                        format!(
                            "override `{value}` disagrees with the suggested value `{suggestion}`"
                        ),
                        false,
                    );
                }
            }
            Ok(suggestion) => {
                if def.property_type.conforms(&suggestion) {
                    value = suggestion;
                    source = ValueSource::Derived;
                } else {
                    warn(
                        format!(
                            "derived value `{suggestion}` is not {}; keeping `{value}`",
                            def.property_type
                        ),
                        false,
                    );
                }
            }
            Err(HookError::NotYetResolved { name }) => {
                return Err(ResolveError::DependencyOrder {
                    property: def.name.clone(),
                    reference: name,
                });
            }
            Err(HookError::Failed { message, fatal }) => {
                warn(format!("derivation failed: {message}"), fatal);
            }
        }
    }

    if let Some(validate) = &def.validate {
        let ctx = HookContext::new(environment, settled);
        match validate(&value, &ctx) {
            Ok(()) => {}
            Err(HookError::NotYetResolved { name }) => {
                return Err(ResolveError::DependencyOrder {
                    property: def.name.clone(),
                    reference: name,
                });
            }
            Err(HookError::Failed { message, fatal }) => warn(message, fatal),
        }
    }

    Ok(ResolvedProperty {
        name: def.name.clone(),
        value,
        source,
        warnings: local,
    })
}
