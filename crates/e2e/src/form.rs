//! Form and link resolution over rendered markup
//!
//! Pure functions: given a parsed page they work out which field a label
//! refers to, what a button click would submit, and where a link goes.
//! The session driver performs the resulting requests.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

use crate::error::{E2eError, E2eResult};
use crate::selector::normalize_text;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static LABELS: Lazy<Selector> = Lazy::new(|| selector("label"));
static FIELDS: Lazy<Selector> = Lazy::new(|| selector("input, textarea, select"));
static BUTTONS: Lazy<Selector> = Lazy::new(|| {
    selector("button, input[type=submit], input[type=button], input[type=image]")
});
static FORMS: Lazy<Selector> = Lazy::new(|| selector("form"));
static OPTIONS: Lazy<Selector> = Lazy::new(|| selector("option"));
static LINKS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static CSRF_PARAM: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="csrf-param"]"#));
static CSRF_TOKEN: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="csrf-token"]"#));

/// A request a button click or link follow turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Lowercase HTTP verb as written in the markup (`get`, `post`)
    pub method: String,
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// The `name` of the field a label refers to. Labels are matched on their
/// text (exact first, then case-insensitively), then `id`, `name` and
/// `placeholder` attributes are tried.
pub fn field_name(document: &Html, label: &str, page: &Url) -> E2eResult<String> {
    let wanted = normalize_text(label);
    let not_found = || E2eError::FieldNotFound(label.to_string(), page.path().to_string());

    let by_label = |strict: bool| {
        document.select(&LABELS).find_map(|lbl| {
            let text = normalize_text(&lbl.text().collect::<String>());
            let matched = if strict {
                text == wanted
            } else {
                text.eq_ignore_ascii_case(&wanted)
            };
            if !matched {
                return None;
            }
            let target = match lbl.value().attr("for") {
                Some(id) => document
                    .select(&FIELDS)
                    .find(|f| f.value().id() == Some(id)),
                None => lbl.select(&FIELDS).next(),
            };
            target.and_then(|f| f.value().attr("name").map(str::to_string))
        })
    };

    if let Some(name) = by_label(true).or_else(|| by_label(false)) {
        return Ok(name);
    }

    document
        .select(&FIELDS)
        .find(|f| {
            let v = f.value();
            v.id() == Some(label)
                || v.attr("name") == Some(label)
                || v.attr("placeholder") == Some(label)
        })
        .and_then(|f| f.value().attr("name").map(str::to_string))
        .ok_or_else(not_found)
}

/// Work out what clicking the button labelled `label` submits.
pub fn button_submission(
    document: &Html,
    label: &str,
    page: &Url,
    filled: &HashMap<String, String>,
) -> E2eResult<Submission> {
    let wanted = normalize_text(label);
    let button = document
        .select(&BUTTONS)
        .find(|b| button_matches(b, label, &wanted))
        .ok_or_else(|| E2eError::ButtonNotFound(label.to_string(), page.path().to_string()))?;

    let form = owning_form(document, &button)
        .ok_or_else(|| E2eError::DetachedButton(label.to_string()))?;

    let method = button
        .value()
        .attr("formmethod")
        .or_else(|| form.value().attr("method"))
        .unwrap_or("get")
        .to_ascii_lowercase();
    let action = match button
        .value()
        .attr("formaction")
        .or_else(|| form.value().attr("action"))
    {
        Some(href) if !href.trim().is_empty() => page.join(href.trim())?,
        _ => page.clone(),
    };

    let mut fields = serialize_form(&form, filled);
    if let Some(name) = button.value().attr("name") {
        fields.push((
            name.to_string(),
            button.value().attr("value").unwrap_or_default().to_string(),
        ));
    }

    Ok(Submission {
        method,
        action,
        fields,
    })
}

/// Resolve the link labelled `label`. Links carrying `data-method` (or
/// `data-turbo-method`) are turned into the form post rails-ujs would send.
pub fn link_submission(document: &Html, label: &str, page: &Url) -> E2eResult<Submission> {
    let wanted = normalize_text(label);
    let link = document
        .select(&LINKS)
        .find(|a| {
            let v = a.value();
            normalize_text(&a.text().collect::<String>()) == wanted
                || v.id() == Some(label)
                || v.attr("title") == Some(label)
        })
        .ok_or_else(|| E2eError::LinkNotFound(label.to_string(), page.path().to_string()))?;

    let href = link.value().attr("href").unwrap_or_default();
    let action = page.join(href)?;
    let verb = link
        .value()
        .attr("data-method")
        .or_else(|| link.value().attr("data-turbo-method"))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "get".to_string());

    if verb == "get" {
        return Ok(Submission {
            method: verb,
            action,
            fields: Vec::new(),
        });
    }

    let mut fields = vec![("_method".to_string(), verb)];
    if let Some((param, token)) = csrf_token(document) {
        fields.push((param, token));
    }
    Ok(Submission {
        method: "post".to_string(),
        action,
        fields,
    })
}

/// The page's CSRF parameter name and token from Rails' meta tags.
pub fn csrf_token(document: &Html) -> Option<(String, String)> {
    let token = document
        .select(&CSRF_TOKEN)
        .next()?
        .value()
        .attr("content")?
        .to_string();
    let param = document
        .select(&CSRF_PARAM)
        .next()
        .and_then(|m| m.value().attr("content"))
        .unwrap_or("authenticity_token")
        .to_string();
    Some((param, token))
}

fn button_matches(button: &ElementRef<'_>, label: &str, wanted: &str) -> bool {
    let v = button.value();
    if v.id() == Some(label) || v.attr("name") == Some(label) || v.attr("title") == Some(label) {
        return true;
    }
    if v.attr("value").map(normalize_text).as_deref() == Some(wanted) {
        return true;
    }
    v.name() == "button" && normalize_text(&button.text().collect::<String>()) == wanted
}

fn owning_form<'a>(document: &'a Html, button: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    if let Some(form_id) = button.value().attr("form") {
        return document
            .select(&FORMS)
            .find(|f| f.value().id() == Some(form_id));
    }
    button
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "form")
}

/// Successful controls of a form, with filled-in values taking precedence
/// over the markup's defaults. Submit buttons are left out; the clicked one
/// is appended by the caller.
fn serialize_form(form: &ElementRef<'_>, filled: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    for control in form.select(&FIELDS) {
        let v = control.value();
        if v.attr("disabled").is_some() {
            continue;
        }
        let Some(name) = v.attr("name") else {
            continue;
        };

        let value = match v.name() {
            "input" => {
                let kind = v.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => continue,
                    "checkbox" | "radio" => {
                        if v.attr("checked").is_none() {
                            continue;
                        }
                        v.attr("value").unwrap_or("on").to_string()
                    }
                    _ => filled
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| v.attr("value").unwrap_or_default().to_string()),
                }
            }
            "textarea" => filled
                .get(name)
                .cloned()
                .unwrap_or_else(|| control.text().collect::<String>()),
            "select" => match filled.get(name) {
                Some(value) => value.clone(),
                None => {
                    let options: Vec<ElementRef<'_>> = control.select(&OPTIONS).collect();
                    let chosen = options
                        .iter()
                        .find(|o| o.value().attr("selected").is_some())
                        .or_else(|| options.first());
                    match chosen {
                        Some(option) => option
                            .value()
                            .attr("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| normalize_text(&option.text().collect::<String>())),
                        None => continue,
                    }
                }
            },
            _ => continue,
        };

        fields.push((name.to_string(), value));
    }

    fields
}
