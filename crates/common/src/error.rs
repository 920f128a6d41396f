//! Error types for the rubric harness

use rusqlite::types::Value;
use thiserror::Error;

/// Result type alias using rubric Error
pub type Result<T> = std::result::Result<T, Error>;

/// Column/value pairs a fixture tried to persist.
pub type Attributes = Vec<(String, Value)>;

/// Rubric error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Backing store unavailable at {location}: {reason}")]
    StoreUnavailable { location: String, reason: String },

    /// The store refused a fixture record. Usually the target's schema is
    /// missing a table or column the rubric relies on.
    #[error("Fixture setup failed for `{table}` {}: {reason}", render_attributes(.attributes))]
    FixtureSetup {
        table: String,
        attributes: Attributes,
        reason: String,
    },

    #[error("Record not found: {kind} with id {id}")]
    NotFound { kind: String, id: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Password digest failed: {0}")]
    PasswordDigest(String),
}

impl From<bcrypt::BcryptError> for Error {
    fn from(e: bcrypt::BcryptError) -> Self {
        Error::PasswordDigest(e.to_string())
    }
}

impl Error {
    /// True when the error means the store itself cannot be reached, as
    /// opposed to the target's schema rejecting a record.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::StoreUnavailable { .. })
    }
}

/// Render attempted attributes for diagnostics. Password digests are never printed.
pub fn render_attributes(attributes: &[(String, Value)]) -> String {
    let fields: Vec<String> = attributes
        .iter()
        .map(|(column, value)| {
            let shown = if column.contains("password") {
                "[redacted]".to_string()
            } else {
                match value {
                    Value::Null => "NULL".to_string(),
                    Value::Integer(i) => i.to_string(),
                    Value::Real(f) => f.to_string(),
                    Value::Text(s) => format!("{:?}", s),
                    Value::Blob(b) => format!("<{} bytes>", b.len()),
                }
            };
            format!("{}: {}", column, shown)
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}
