//! Rubric Common Library
//!
//! Shared data model, fixture persistence and scoring for the rubric
//! grading harness.

pub mod db;
pub mod error;
pub mod fixture;
pub mod score;
pub mod types;

// Re-export commonly used types
pub use db::Store;
pub use error::{Error, Result};
pub use fixture::{FactoryConfig, FixtureFactory, RandomSuffix, SequenceSuffix, SuffixSource};
pub use score::{aggregate, ScoreReport};
pub use types::*;

/// Rubric version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default location of the target's backing store, relative to the
/// application root (Rails development database).
pub fn default_database_path() -> std::path::PathBuf {
    std::path::PathBuf::from("db").join("development.sqlite3")
}
