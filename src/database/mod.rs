// Database module
// PostgreSQL + pgvector: catalog introspection, per-column similarity queries and
// in-place embedding columns on the tracked tables

pub mod postgres;

pub use postgres::*;
