//! `{placeholder}` expansion for paths, field values and selector text

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

use crate::error::{E2eError, E2eResult};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("placeholder pattern is valid"));

/// Values a scenario can refer to, e.g. `{username}` or `{photo_id}`.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Expand every placeholder. Unknown names are an error so a typo in a
    /// catalog never turns into a request for a literal `{usernme}` path.
    pub fn resolve(&self, template: &str) -> E2eResult<String> {
        if let Some(missing) = PLACEHOLDER
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .find(|name| !self.values.contains_key(name))
        {
            return Err(E2eError::UnresolvedPlaceholder(missing));
        }

        Ok(PLACEHOLDER
            .replace_all(template, |caps: &Captures| self.values[&caps[1]].clone())
            .into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        b.set("username", "alice_42");
        b.set("photo_id", "7");
        b
    }

    #[test]
    fn test_resolves_known_placeholders() {
        let b = bindings();
        assert_eq!(b.resolve("/{username}/liked").unwrap(), "/alice_42/liked");
        assert_eq!(b.resolve("Edit {username}").unwrap(), "Edit alice_42");
        assert_eq!(b.resolve("/photos/{photo_id}").unwrap(), "/photos/7");
        assert_eq!(b.resolve("/").unwrap(), "/");
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        let err = bindings().resolve("/{usernme}").unwrap_err();
        assert!(matches!(err, E2eError::UnresolvedPlaceholder(ref n) if n == "usernme"));
    }

    #[test]
    fn test_non_placeholder_braces_are_left_alone() {
        assert_eq!(bindings().resolve("{ not: one }").unwrap(), "{ not: one }");
    }
}
