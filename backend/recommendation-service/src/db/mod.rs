//! Postgres repositories over the platform catalog schema.
//!
//! Table and column names follow the API service's Prisma schema (quoted
//! camelCase identifiers); the embedding columns are pgvector `vector`s.

pub mod catalog_repo;
pub mod history_repo;

pub use catalog_repo::{CatalogRepository, PgCatalogRepository};
pub use history_repo::{HistoryRepository, PgHistoryRepository};
