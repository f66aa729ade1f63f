use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Looks up a translated template and substitutes its variables.
pub trait Localizer {
    fn translate(&self, namespace: &str, key: &str, vars: &[(&str, &str)]) -> String;
}

/// Translation templates grouped by namespace, e.g. `core.untitled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Translations {
    namespaces: IndexMap<String, IndexMap<String, String>>,
}

impl Default for Translations {
    fn default() -> Self {
        Self::empty().with("core", "untitled", "Untitled :libraryTitle")
    }
}

impl Translations {
    pub fn empty() -> Self {
        Self {
            namespaces: IndexMap::new(),
        }
    }

    pub fn with(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.insert(namespace, key, template);
        self
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), template.into());
    }

    /// Overlays `other` on top of `self`; keys present in both take `other`'s template.
    pub fn merge(mut self, other: Translations) -> Self {
        for (namespace, keys) in other.namespaces {
            let target = self.namespaces.entry(namespace).or_default();
            target.extend(keys);
        }
        self
    }

    pub fn template(&self, namespace: &str, key: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }
}

impl Localizer for Translations {
    fn translate(&self, namespace: &str, key: &str, vars: &[(&str, &str)]) -> String {
        let Some(template) = self.template(namespace, key) else {
            return format!("[Missing translation {namespace}:{key}]");
        };
        substitute(template, vars)
    }
}

/// Replaces each variable occurrence in one pass over `template`. Substituted
/// values are never scanned again; at a position where several names match,
/// the longest wins.
fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut text = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(ch) = rest.chars().next() {
        let matched = vars
            .iter()
            .filter(|(name, _)| !name.is_empty() && rest.starts_with(*name))
            .max_by_key(|(name, _)| name.len());
        match matched {
            Some((name, value)) => {
                text.push_str(value);
                rest = &rest[name.len()..];
            }
            None => {
                text.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    text
}
