//! Declarative scenario definitions
//!
//! A scenario is data: a precondition, fixtures to create, steps to drive
//! the session with, and one expectation. Scenarios are built in Rust for
//! the built-in rubric or parsed from YAML.

use serde::{Deserialize, Serialize};

use crate::selector::SelectorSpec;

/// Session state a scenario starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Guest session
    #[default]
    Anonymous,
    /// A fresh actor is created and signed in before setup runs
    Authenticated,
}

/// A record created directly in the backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    /// The scenario's actor, for guest scenarios that still need one
    Actor,
    /// Photos owned by the scenario's actor
    Photo {
        #[serde(default = "default_count")]
        count: usize,
    },
    /// A comment by the scenario's actor on its first photo
    Comment,
}

fn default_count() -> usize {
    1
}

/// One interaction with the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Visit a path relative to the application root
    Navigate { path: String },
    /// Fill in the field with the given label
    Fill { label: String, value: String },
    /// Click a submit button
    ClickButton { label: String },
    /// Follow a link
    ClickLink { label: String },
    /// Sign the session out
    SignOut,
}

impl Step {
    pub fn navigate(path: impl Into<String>) -> Self {
        Step::Navigate { path: path.into() }
    }

    pub fn fill(label: impl Into<String>, value: impl Into<String>) -> Self {
        Step::Fill {
            label: label.into(),
            value: value.into(),
        }
    }

    pub fn click_button(label: impl Into<String>) -> Self {
        Step::ClickButton {
            label: label.into(),
        }
    }

    pub fn click_link(label: impl Into<String>) -> Self {
        Step::ClickLink {
            label: label.into(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { path } => format!("navigate:{}", path),
            Step::Fill { label, .. } => format!("fill:{}", label),
            Step::ClickButton { label } => format!("click_button:{}", label),
            Step::ClickLink { label } => format!("click_link:{}", label),
            Step::SignOut => "sign_out".to_string(),
        }
    }
}

/// What must hold once the steps have run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Expectation {
    HasElement { selector: SelectorSpec },
    LacksElement { selector: SelectorSpec },
    /// Path of the current page after redirects
    CurrentPath { path: String },
    Status { code: u16 },
    /// An integer column on the actor's own row
    ActorColumn { column: String, equals: i64 },
    /// Change in the number of comments on the first photo since setup
    CommentCountDelta { by: i64 },
    /// Every nested expectation holds
    All { of: Vec<Expectation> },
}

impl Expectation {
    pub fn has(selector: SelectorSpec) -> Self {
        Expectation::HasElement { selector }
    }

    pub fn lacks(selector: SelectorSpec) -> Self {
        Expectation::LacksElement { selector }
    }

    pub fn current_path(path: impl Into<String>) -> Self {
        Expectation::CurrentPath { path: path.into() }
    }

    /// Whether evaluating this expectation needs a comment count baseline.
    pub fn needs_comment_baseline(&self) -> bool {
        match self {
            Expectation::CommentCountDelta { .. } => true,
            Expectation::All { of } => of.iter().any(Expectation::needs_comment_baseline),
            _ => false,
        }
    }
}

/// A named, weighted, independently runnable behavioral check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Weight in points; must be positive
    pub points: u32,
    #[serde(default)]
    pub precondition: Precondition,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub setup: Vec<Fixture>,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub expect: Expectation,
    /// Shown to the student when the expectation does not hold
    pub diagnostic: String,
}

impl Scenario {
    fn new(name: impl Into<String>, points: u32, precondition: Precondition) -> Self {
        Self {
            name: name.into(),
            points,
            precondition,
            tags: Vec::new(),
            setup: Vec::new(),
            steps: Vec::new(),
            expect: Expectation::All { of: Vec::new() },
            diagnostic: String::new(),
        }
    }

    pub fn anonymous(name: impl Into<String>, points: u32) -> Self {
        Self::new(name, points, Precondition::Anonymous)
    }

    pub fn authenticated(name: impl Into<String>, points: u32) -> Self {
        Self::new(name, points, Precondition::Authenticated)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn setup(mut self, fixture: Fixture) -> Self {
        self.setup.push(fixture);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expect = expectation;
        self
    }

    pub fn diagnostic(mut self, message: impl Into<String>) -> Self {
        self.diagnostic = message.into();
        self
    }
}
