//! Property-reference rendering over Tera.
//!
//! Property names are dotted (`main.pidfile_dir`), but Tera parses a dot as
//! field access. The engine therefore rewrites each plain dotted reference
//! inside a `{{ }}` span to a munged identifier (dots become `___`) and
//! builds the context under the munged keys. References are extracted before
//! rendering, so a missing name is reported in its original dotted form and
//! anything fancier than a plain reference (filters, expressions) passes
//! through to Tera untouched.

use std::collections::BTreeSet;

use tera::Tera;

use stagehand_core::types::{PropertyName, PropertyValue, Resolution};

use crate::error::RenderError;

const MUNGE_JOINER: &str = "___";

// ---------------------------------------------------------------------------
// Reference scanning
// ---------------------------------------------------------------------------

fn munge(name: &str) -> String {
    name.replace('.', MUNGE_JOINER)
}

/// Whether a trimmed `{{ }}` span body is a plain dotted property reference.
fn is_plain_reference(body: &str) -> bool {
    let mut segments = body.split('.');
    let first = match segments.next() {
        Some(s) => s,
        None => return false,
    };
    let leading_ok = first
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !leading_ok || !first.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    segments.all(|s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Rewrite plain references to munged identifiers, collecting the dotted
/// originals. Non-reference spans and unterminated braces pass through.
fn scan(template: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut refs = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let (head, tail) = rest.split_at(open);
        out.push_str(head);
        match tail[2..].find("}}") {
            Some(close) => {
                let body = &tail[2..2 + close];
                let trimmed = body.trim();
                if is_plain_reference(trimmed) {
                    refs.push(trimmed.to_owned());
                    out.push_str("{{ ");
                    out.push_str(&munge(trimmed));
                    out.push_str(" }}");
                } else {
                    out.push_str(&tail[..2 + close + 2]);
                }
                rest = &tail[2 + close + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, refs)
}

/// Dotted property names referenced by `template`.
pub fn references(template: &str) -> Vec<String> {
    scan(template).1
}

// ---------------------------------------------------------------------------
// PropertyScope
// ---------------------------------------------------------------------------

/// A set of property values prepared for rendering.
///
/// Build once per resolved map, render many templates against it.
pub struct PropertyScope {
    context: tera::Context,
    keys: BTreeSet<String>,
}

impl PropertyScope {
    pub fn new<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a PropertyName, &'a PropertyValue)>,
    {
        let mut context = tera::Context::new();
        let mut keys = BTreeSet::new();
        for (name, value) in pairs {
            context.insert(munge(&name.0), value);
            keys.insert(name.0.clone());
        }
        Self { context, keys }
    }

    /// Scope over a resolution's effective values.
    pub fn from_resolution(resolution: &Resolution) -> Self {
        Self::new(resolution.properties.iter().map(|(name, p)| (name, &p.value)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains(name)
    }

    /// Render one template against this scope.
    ///
    /// Fails with [`RenderError::MissingReference`] (naming the dotted
    /// property) before Tera ever sees the template.
    pub fn render(&self, template: &str) -> Result<String, RenderError> {
        let (munged, refs) = scan(template);
        for reference in refs {
            if !self.keys.contains(&reference) {
                return Err(RenderError::MissingReference {
                    name: PropertyName::from(reference),
                });
            }
        }
        Tera::one_off(&munged, &self.context, false).map_err(RenderError::from)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, PropertyValue)]) -> PropertyScope {
        let owned: Vec<(PropertyName, PropertyValue)> = pairs
            .iter()
            .map(|(n, v)| (PropertyName::from(*n), v.clone()))
            .collect();
        PropertyScope::new(owned.iter().map(|(n, v)| (n, v)))
    }

    #[test]
    fn renders_dotted_references() {
        let scope = scope(&[
            ("main.host", PropertyValue::from("localhost")),
            ("main.port", PropertyValue::Int(9090)),
        ]);
        let out = scope
            .render("http://{{ main.host }}:{{ main.port }}/")
            .expect("render");
        assert_eq!(out, "http://localhost:9090/");
    }

    #[test]
    fn renders_bool_and_bare_text() {
        let scope = scope(&[("cache.enabled", PropertyValue::Bool(true))]);
        assert_eq!(
            scope.render("--cache={{cache.enabled}}").expect("render"),
            "--cache=true"
        );
        assert_eq!(scope.render("no references").expect("render"), "no references");
    }

    #[test]
    fn missing_reference_reports_original_dotted_name() {
        let scope = scope(&[("main.port", PropertyValue::Int(1))]);
        let err = scope.render("{{ main.hosts }}").unwrap_err();
        match err {
            RenderError::MissingReference { name } => assert_eq!(name.0, "main.hosts"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn references_are_extracted_in_order() {
        let refs = references("{{ a.b }} text {{ c }} {{ a.b }}");
        assert_eq!(refs, vec!["a.b", "c", "a.b"]);
    }

    #[test]
    fn non_reference_spans_pass_through_to_tera() {
        // A filter expression is not a plain reference; Tera evaluates it.
        let scope = scope(&[("main.host", PropertyValue::from("x"))]);
        let out = scope.render("{{ \"lit\" | upper }}").expect("render");
        assert_eq!(out, "LIT");
    }

    #[test]
    fn unterminated_span_is_a_template_error() {
        let scope = scope(&[("a", PropertyValue::Int(1))]);
        let err = scope.render("{{ a").unwrap_err();
        assert!(matches!(err, RenderError::Tera(_)));
    }

    #[test]
    fn plain_reference_grammar() {
        assert!(is_plain_reference("main.port"));
        assert!(is_plain_reference("_x.y_2"));
        assert!(is_plain_reference("workers"));
        assert!(!is_plain_reference("2fast.start"));
        assert!(!is_plain_reference("a..b"));
        assert!(!is_plain_reference("a.b | upper"));
        assert!(!is_plain_reference(""));
    }
}
