//! Quoting for catalog-derived identifiers.
//!
//! Schema, table, column and type names are spliced into SQL text because
//! PostgreSQL cannot bind identifiers as parameters. Every such name goes
//! through [`Ident`], which always emits a double-quoted identifier with
//! embedded quotes doubled. Values are never formatted into SQL.


use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Identifier cannot be empty")]
    Empty,
    #[error("Identifier contains a NUL character: {0:?}")]
    ContainsNul(String),
}

/// A double-quoted SQL identifier, safe to splice into statement text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    #[inline]
    pub fn quote(raw: &str) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.contains('\0') {
            return Err(IdentifierError::ContainsNul(raw.to_string()));
        }

        Ok(Self(format!("\"{}\"", raw.replace('"', "\"\""))))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `"schema"."table"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTable {
    schema: Ident,
    table: Ident,
}

impl QualifiedTable {
    #[inline]
    pub fn new(schema: &str, table: &str) -> Result<Self, IdentifierError> {
        Ok(Self {
            schema: Ident::quote(schema)?,
            table: Ident::quote(table)?,
        })
    }
}

impl fmt::Display for QualifiedTable {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
