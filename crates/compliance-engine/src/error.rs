//! Errors that abort a screening scenario
//!
//! Everything else (unresolved descriptors, rejected overrides, missing
//! product data) is reported through `Annotation`s on the result.

use thiserror::Error;

use crate::jurisdiction::Jurisdiction;

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),

    #[error("failed to load {table} table for {jurisdiction}: {reason}")]
    SchemaLoad {
        jurisdiction: Jurisdiction,
        table: &'static str,
        reason: String,
    },

    #[error("malformed {table} table for {jurisdiction}")]
    SchemaFormat {
        jurisdiction: Jurisdiction,
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {table} table for {jurisdiction}: {reason}")]
    InvalidSchema {
        jurisdiction: Jurisdiction,
        table: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ScreeningError>;
