//! Error types for scenario execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Target failed to start: {0}")]
    TargetStartup(String),

    #[error("Target at {url} not ready after {attempts} attempts")]
    TargetNotReady { url: String, attempts: usize },

    #[error("Timed out after {after_ms} ms waiting for {operation}")]
    InteractionTimeout { operation: String, after_ms: u64 },

    #[error("Navigation to {path} failed: {reason}")]
    NavigationFailure { path: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionMismatch(String),

    #[error("Sign-in as {username} did not complete; still at {path}")]
    NotAuthenticated { username: String, path: String },

    #[error("No page has been loaded yet")]
    NoPage,

    #[error("No field labelled {0:?} on {1}")]
    FieldNotFound(String, String),

    #[error("No button labelled {0:?} on {1}")]
    ButtonNotFound(String, String),

    #[error("No link labelled {0:?} on {1}")]
    LinkNotFound(String, String),

    #[error("Button {0:?} is not inside a form")]
    DetachedButton(String),

    #[error("Invalid selector {selector}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Placeholder {{{0}}} has no value in this scenario")]
    UnresolvedPlaceholder(String),

    #[error("Scenario needs a {0} fixture that setup did not create")]
    MissingFixture(&'static str),

    #[error("Invalid catalog: {0}")]
    CatalogInvalid(String),

    #[error("Fixture error: {0}")]
    Fixture(#[from] rubric_common::Error),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl E2eError {
    /// Errors that must stop the whole run instead of a single scenario.
    /// Only an unreachable backing store qualifies; a target that never
    /// comes up still yields a report.
    pub fn is_fatal(&self) -> bool {
        match self {
            E2eError::Fixture(e) => e.is_infrastructure(),
            _ => false,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
