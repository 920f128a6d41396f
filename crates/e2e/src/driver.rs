//! Browser-like HTTP session against the application under test
//!
//! Each [`Session`] owns its own client and cookie jar, follows redirects,
//! fills and submits forms and keeps the last rendered page around for
//! element queries. A missing route shows up as a non-2xx status, never as
//! an error; only transport failures and timeouts are errors.

use reqwest::{Client, RequestBuilder};
use scraper::Html;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{E2eError, E2eResult};
use crate::form::{self, Submission};
use crate::selector::SelectorSpec;

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Root URL of the application under test
    pub base_url: String,
    /// Bound on each request, including reading the body
    pub request_timeout: Duration,
    pub sign_in_path: String,
    pub sign_out_path: String,
    pub email_label: String,
    pub password_label: String,
    pub sign_in_button: String,
    pub user_agent: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            request_timeout: Duration::from_secs(10),
            sign_in_path: "/users/sign_in".to_string(),
            sign_out_path: "/users/sign_out".to_string(),
            email_label: "Email".to_string(),
            password_label: "Password".to_string(),
            sign_in_button: "Log in".to_string(),
            user_agent: format!("rubric/{}", rubric_common::VERSION),
        }
    }
}

/// The most recently rendered page
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// A single browsing session
pub struct Session {
    client: Client,
    base: Url,
    config: DriverConfig,
    page: Option<Page>,
    filled: HashMap<String, String>,
    authenticated: bool,
}

impl Session {
    /// Create a session with a fresh cookie jar
    pub fn new(config: DriverConfig) -> E2eResult<Self> {
        let base = Url::parse(&config.base_url)?;
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base,
            config,
            page: None,
            filled: HashMap::new(),
            authenticated: false,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// GET a path relative to the base URL
    pub async fn navigate(&mut self, path: &str) -> E2eResult<()> {
        let url = self.base.join(path)?;
        debug!("GET {}", url);
        let request = self.client.get(url);
        self.perform(path, request).await
    }

    /// Remember a value for the field labelled `label` on the current page.
    pub fn fill_field(&mut self, label: &str, value: &str) -> E2eResult<()> {
        let page = self.page.as_ref().ok_or(E2eError::NoPage)?;
        let name = {
            let document = Html::parse_document(&page.body);
            form::field_name(&document, label, &page.url)?
        };
        debug!("fill {} ({}) = {:?}", label, name, value);
        self.filled.insert(name, value.to_string());
        Ok(())
    }

    /// Submit the form owning the button labelled `label`.
    pub async fn click_button(&mut self, label: &str) -> E2eResult<()> {
        let page = self.page.as_ref().ok_or(E2eError::NoPage)?;
        let submission = {
            let document = Html::parse_document(&page.body);
            form::button_submission(&document, label, &page.url, &self.filled)?
        };
        self.submit(submission).await
    }

    /// Follow the link labelled `label`, honouring `data-method`.
    pub async fn click_link(&mut self, label: &str) -> E2eResult<()> {
        let page = self.page.as_ref().ok_or(E2eError::NoPage)?;
        let submission = {
            let document = Html::parse_document(&page.body);
            form::link_submission(&document, label, &page.url)?
        };
        self.submit(submission).await
    }

    /// End the session through the sign-out route with DELETE semantics.
    pub async fn sign_out(&mut self) -> E2eResult<()> {
        let action = self.base.join(&self.config.sign_out_path)?;
        let mut fields = vec![("_method".to_string(), "delete".to_string())];
        if let Some(page) = &self.page {
            let document = Html::parse_document(&page.body);
            if let Some(token) = form::csrf_token(&document) {
                fields.push(token);
            }
        }
        self.submit(Submission {
            method: "post".to_string(),
            action,
            fields,
        })
        .await?;
        self.authenticated = false;
        Ok(())
    }

    /// Path of the current page, after redirects
    pub fn current_path(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.path())
    }

    pub fn status_code(&self) -> Option<u16> {
        self.page.as_ref().map(|p| p.status)
    }

    pub fn body(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.body.as_str())
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_element(&self, selector: &SelectorSpec) -> E2eResult<bool> {
        let page = self.page.as_ref().ok_or(E2eError::NoPage)?;
        selector.matches_html(&page.body)
    }

    pub fn lacks_element(&self, selector: &SelectorSpec) -> E2eResult<bool> {
        Ok(!self.has_element(selector)?)
    }

    async fn submit(&mut self, submission: Submission) -> E2eResult<()> {
        let origin = self.current_path().map(str::to_string);
        let target = submission.action.path().to_string();
        debug!("{} {} ({} fields)", submission.method.to_uppercase(), submission.action, submission.fields.len());

        let request = if submission.method == "get" {
            self.client.get(submission.action.clone()).query(&submission.fields)
        } else {
            self.client.post(submission.action.clone()).form(&submission.fields)
        };
        self.perform(&target, request).await?;

        let arrived = self.current_path().unwrap_or_default().to_string();
        if origin.as_deref() == Some(self.config.sign_in_path.as_str()) && submission.method != "get" {
            self.authenticated = arrived != self.config.sign_in_path
                && self.status_code().is_some_and(|s| s < 400);
            info!("Sign-in submission landed on {} (authenticated: {})", arrived, self.authenticated);
        }
        if target == self.config.sign_out_path {
            self.authenticated = false;
        }
        Ok(())
    }

    async fn perform(&mut self, path: &str, request: RequestBuilder) -> E2eResult<()> {
        let limit = self.config.request_timeout;
        let timed_out = || E2eError::InteractionTimeout {
            operation: format!("response from {}", path),
            after_ms: limit.as_millis() as u64,
        };
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                timed_out()
            } else {
                E2eError::NavigationFailure {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = tokio::time::timeout(limit, request.send())
            .await
            .map_err(|_| timed_out())?
            .map_err(transport)?;
        let url = response.url().clone();
        let status = response.status().as_u16();
        let body = tokio::time::timeout(limit, response.text())
            .await
            .map_err(|_| timed_out())?
            .map_err(transport)?;

        debug!("{} -> {} ({} bytes)", path, status, body.len());
        self.page = Some(Page { url, status, body });
        self.filled.clear();
        Ok(())
    }
}
