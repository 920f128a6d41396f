//! Core data model shared by the fixture factory, the scenario engine and reporting

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Fixture records
// ============================================================================

/// An ephemeral user identity created directly in the target's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Plain-text credential used to sign in through the UI.
    #[serde(skip_serializing, default)]
    pub password: String,
}

/// A photo owned by exactly one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub image: String,
    pub caption: String,
    pub owner_id: i64,
}

/// A comment left by an actor on a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub author_id: i64,
    pub photo_id: i64,
}

// ============================================================================
// Scenario results
// ============================================================================

/// How a single scenario ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The target behaved as the rubric expects.
    Passed,
    /// The target was reachable but behaved incorrectly.
    Failed,
    /// The target is not wired for the feature at all (setup, timeout, gate).
    Errored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Errored => "errored",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recorded result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub group: String,
    pub points: u32,
    pub outcome: Outcome,
    /// Present iff the outcome is not `Passed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ScenarioResult {
    pub fn passed(group: impl Into<String>, name: impl Into<String>, points: u32) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            points,
            outcome: Outcome::Passed,
            diagnostic: None,
            duration_ms: 0,
        }
    }

    pub fn failed(
        group: impl Into<String>,
        name: impl Into<String>,
        points: u32,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            points,
            outcome: Outcome::Failed,
            diagnostic: Some(diagnostic.into()),
            duration_ms: 0,
        }
    }

    pub fn errored(
        group: impl Into<String>,
        name: impl Into<String>,
        points: u32,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            points,
            outcome: Outcome::Errored,
            diagnostic: Some(diagnostic.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Points this result contributes to the earned score.
    pub fn earned(&self) -> u32 {
        match self.outcome {
            Outcome::Passed => self.points,
            Outcome::Failed | Outcome::Errored => 0,
        }
    }
}
