//! # electra-store
//!
//! Relational persistence for ingested grids. [`GridRepository`] is the seam
//! the HTTP layer depends on; [`PgRepository`] backs it with Postgres and
//! [`MemoryRepository`] keeps everything in process.
//!
//! The schema is created and upgraded in place by [`schema::ensure_schema`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod rows;
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryRepository;
pub use postgres::PgRepository;
pub use repository::{CascadeSummary, GridRepository, IngestSummary, INGEST_ORDER};
pub use rows::{
    BusRow, ElementRow, GeneratorRow, GridRow, LineRow, LoadRow, ShuntRow, Transformer2WRow,
};
pub use schema::{ensure_schema, Migration, MIGRATIONS};
