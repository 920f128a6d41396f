//! Structured element selectors
//!
//! Expectations describe elements as a tag, attribute predicates and an
//! optional text filter instead of hand-written CSS. The descriptor is
//! compiled to CSS only when it is evaluated against a page.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{E2eError, E2eResult};
use crate::template::Bindings;

/// How an attribute value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrOp {
    /// `[name="value"]`
    #[default]
    Equals,
    /// `[name^="value"]`
    Prefix,
    /// `[name*="value"]`
    Contains,
    /// `[name~="value"]`, one of the whitespace separated words
    Word,
    /// `[name]`
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrPredicate {
    pub name: String,
    #[serde(default)]
    pub op: AttrOp,
    #[serde(default)]
    pub value: Option<String>,
}

/// An element descriptor: `tag[attr…]` plus a text filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// Element name; `None` matches any element
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub attrs: Vec<AttrPredicate>,
    /// Substring the element's whitespace-normalized text must contain
    #[serde(default)]
    pub text: Option<String>,
}

impl SelectorSpec {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            attrs: Vec::new(),
            text: None,
        }
    }

    pub fn any() -> Self {
        Self {
            tag: None,
            attrs: Vec::new(),
            text: None,
        }
    }

    fn with_attr(mut self, name: impl Into<String>, op: AttrOp, value: Option<String>) -> Self {
        self.attrs.push(AttrPredicate {
            name: name.into(),
            op,
            value,
        });
        self
    }

    pub fn attr_eq(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attr(name, AttrOp::Equals, Some(value.into()))
    }

    pub fn attr_prefix(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attr(name, AttrOp::Prefix, Some(value.into()))
    }

    pub fn attr_contains(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attr(name, AttrOp::Contains, Some(value.into()))
    }

    pub fn attr_word(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attr(name, AttrOp::Word, Some(value.into()))
    }

    pub fn attr_present(self, name: impl Into<String>) -> Self {
        self.with_attr(name, AttrOp::Present, None)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// CSS for the structural part of the descriptor (the text filter is
    /// applied separately).
    pub fn to_css(&self) -> String {
        let mut css = self.tag.clone().unwrap_or_else(|| "*".to_string());
        for attr in &self.attrs {
            let value = attr.value.as_deref().map(css_string).unwrap_or_default();
            let part = match attr.op {
                AttrOp::Present => format!("[{}]", attr.name),
                AttrOp::Equals => format!("[{}={}]", attr.name, value),
                AttrOp::Prefix => format!("[{}^={}]", attr.name, value),
                AttrOp::Contains => format!("[{}*={}]", attr.name, value),
                AttrOp::Word => format!("[{}~={}]", attr.name, value),
            };
            css.push_str(&part);
        }
        css
    }

    /// Expand placeholders in attribute values and the text filter.
    pub fn resolve(&self, bindings: &Bindings) -> E2eResult<Self> {
        let mut resolved = self.clone();
        for attr in &mut resolved.attrs {
            if let Some(value) = &attr.value {
                attr.value = Some(bindings.resolve(value)?);
            }
        }
        if let Some(text) = &resolved.text {
            resolved.text = Some(bindings.resolve(text)?);
        }
        Ok(resolved)
    }

    fn compile(&self) -> E2eResult<Selector> {
        for attr in &self.attrs {
            if attr.op != AttrOp::Present && attr.value.is_none() {
                return Err(E2eError::InvalidSelector {
                    selector: self.to_string(),
                    reason: format!("attribute {:?} needs a value", attr.name),
                });
            }
        }
        let css = self.to_css();
        Selector::parse(&css).map_err(|e| E2eError::InvalidSelector {
            selector: css.clone(),
            reason: format!("{:?}", e),
        })
    }

    /// Number of matching elements in a parsed document.
    pub fn count(&self, document: &Html) -> E2eResult<usize> {
        let selector = self.compile()?;
        Ok(document
            .select(&selector)
            .filter(|el| self.text_matches(el))
            .count())
    }

    /// Whether at least one element in `html` matches. Markup is parsed
    /// leniently, so broken HTML simply yields fewer matches.
    pub fn matches_html(&self, html: &str) -> E2eResult<bool> {
        let document = Html::parse_document(html);
        Ok(self.count(&document)? > 0)
    }

    fn text_matches(&self, element: &ElementRef<'_>) -> bool {
        match &self.text {
            None => true,
            Some(wanted) => normalize_text(&element.text().collect::<String>())
                .contains(&normalize_text(wanted)),
        }
    }
}

impl fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_css())?;
        if let Some(text) = &self.text {
            write!(f, " with text {:?}", text)?;
        }
        Ok(())
    }
}

/// Collapse runs of whitespace the way a browser renders text.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const HOME: &str = r#"
        <html><body>
          <nav class="navbar navbar-expand-lg">
            <a href="/users/edit">Edit
               alice_42</a>
            <a href="/users/sign_out" data-method="delete" rel="nofollow">Sign out</a>
          </nav>
          <div class="card mb-3"><p>caption #1</p></div>
        </body></html>
    "#;

    #[test_case(SelectorSpec::tag("nav").attr_prefix("class", "navbar"), true ; "navbar prefix")]
    #[test_case(SelectorSpec::tag("nav").attr_eq("class", "navbar"), false ; "navbar exact")]
    #[test_case(SelectorSpec::tag("a").attr_eq("href", "/users/edit").with_text("Edit alice_42"), true ; "edit link text")]
    #[test_case(SelectorSpec::tag("a").attr_eq("href", "/users/edit").with_text("Edit bob"), false ; "edit link other user")]
    #[test_case(SelectorSpec::tag("a").attr_eq("href", "/users/sign_out").attr_eq("data-method", "delete"), true ; "sign out delete")]
    #[test_case(SelectorSpec::tag("a").attr_eq("href", "/users/sign_in"), false ; "no sign in link")]
    #[test_case(SelectorSpec::tag("div").attr_word("class", "card"), true ; "card word")]
    #[test_case(SelectorSpec::any().with_text("caption #1"), true ; "any element text")]
    #[test_case(SelectorSpec::tag("a").attr_present("rel"), true ; "attribute present")]
    fn test_matches_home_page(selector: SelectorSpec, expected: bool) {
        assert_eq!(selector.matches_html(HOME).unwrap(), expected, "{}", selector);
    }

    #[test]
    fn test_to_css_quotes_values() {
        let selector = SelectorSpec::tag("a")
            .attr_eq("href", "/users/sign_out")
            .attr_eq("title", "say \"hi\"");
        assert_eq!(
            selector.to_css(),
            r#"a[href="/users/sign_out"][title="say \"hi\""]"#
        );
    }

    #[test]
    fn test_malformed_markup_does_not_error() {
        let selector = SelectorSpec::tag("nav");
        assert!(!selector.matches_html("<div><p>unclosed <b>tags").unwrap());
        assert!(!selector.matches_html("").unwrap());
    }

    #[test]
    fn test_invalid_selector_is_error() {
        let selector = SelectorSpec::tag("a[[");
        assert!(matches!(
            selector.matches_html(HOME),
            Err(E2eError::InvalidSelector { .. })
        ));

        let valueless = SelectorSpec::tag("a").with_attr("href", AttrOp::Equals, None);
        assert!(valueless.matches_html(HOME).is_err());
    }

    #[test]
    fn test_resolve_expands_text_and_values() {
        let mut bindings = Bindings::new();
        bindings.set("username", "alice_42");
        let selector = SelectorSpec::tag("a")
            .attr_eq("href", "/{username}")
            .with_text("Edit {username}")
            .resolve(&bindings)
            .unwrap();
        assert_eq!(selector.attrs[0].value.as_deref(), Some("/alice_42"));
        assert_eq!(selector.text.as_deref(), Some("Edit alice_42"));
    }

    #[test]
    fn test_yaml_descriptor() {
        let selector: SelectorSpec = serde_yaml::from_str(
            r#"
tag: a
attrs:
  - name: href
    value: /users/sign_in
"#,
        )
        .unwrap();
        assert_eq!(selector.to_css(), r#"a[href="/users/sign_in"]"#);
    }
}
