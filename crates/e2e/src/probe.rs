//! Schema capability probes
//!
//! A scenario group can require tables or columns in the backing store.
//! The probe runs once per group before any of its scenarios; if something
//! is missing, the whole group is reported as errored with one diagnostic
//! instead of each scenario failing on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

use rubric_common::Store;

use crate::error::E2eResult;

/// Something the backing store must provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capability {
    Table { name: String },
    Column { table: String, name: String },
}

impl Capability {
    pub fn table(name: impl Into<String>) -> Self {
        Capability::Table { name: name.into() }
    }

    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Capability::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn check(&self, store: &Store) -> E2eResult<bool> {
        let present = match self {
            Capability::Table { name } => store.table_exists(name)?,
            Capability::Column { table, name } => store.column_exists(table, name)?,
        };
        Ok(present)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Table { name } => write!(f, "table {}", name),
            Capability::Column { table, name } => write!(f, "column {}.{}", table, name),
        }
    }
}

/// Result of probing a group's requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Open,
    Closed { missing: Vec<Capability> },
}

impl GateVerdict {
    pub fn is_open(&self) -> bool {
        matches!(self, GateVerdict::Open)
    }

    /// Human-readable list of what is missing, empty when open.
    pub fn describe_missing(&self) -> String {
        match self {
            GateVerdict::Open => String::new(),
            GateVerdict::Closed { missing } => missing
                .iter()
                .map(Capability::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Check every requirement; a store error propagates instead of closing
/// the gate.
pub fn probe(store: &Store, requires: &[Capability]) -> E2eResult<GateVerdict> {
    let mut missing = Vec::new();
    for capability in requires {
        if !capability.check(store)? {
            missing.push(capability.clone());
        }
    }
    if missing.is_empty() {
        Ok(GateVerdict::Open)
    } else {
        Ok(GateVerdict::Closed { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let store = Store::open_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT, likes_count INTEGER);",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_all_present_is_open() {
        let verdict = probe(
            &store(),
            &[Capability::table("users"), Capability::column("users", "likes_count")],
        )
        .unwrap();
        assert!(verdict.is_open());
        assert_eq!(verdict.describe_missing(), "");
    }

    #[test]
    fn test_missing_items_are_listed() {
        let verdict = probe(
            &store(),
            &[
                Capability::table("users"),
                Capability::table("comments"),
                Capability::column("users", "comments_count"),
            ],
        )
        .unwrap();
        assert_eq!(
            verdict,
            GateVerdict::Closed {
                missing: vec![
                    Capability::table("comments"),
                    Capability::column("users", "comments_count"),
                ]
            }
        );
        assert_eq!(
            verdict.describe_missing(),
            "table comments, column users.comments_count"
        );
    }

    #[test]
    fn test_column_of_missing_table_is_missing() {
        let verdict = probe(&store(), &[Capability::column("photos", "caption")]).unwrap();
        assert!(!verdict.is_open());
    }

    #[test]
    fn test_empty_requirements_are_open() {
        assert!(probe(&store(), &[]).unwrap().is_open());
    }
}
