//! Semantic memory persistence over SPARQL.
//!
//! Semstore stores prompt/response interactions and their embeddings in an RDF triple
//! store, caches read queries against it, and keeps an in-process vector index in
//! step with the stored records so related past interactions can be found by
//! nearest-neighbour search.
//!
//! # Architecture
//!
//! - **Transport**: SPARQL 1.1 protocol over HTTP POST with Basic auth
//! - **Transactions**: copy-on-begin / drop-on-commit / restore-on-rollback using a
//!   backup graph in the store
//! - **Cache**: TTL- and size-bounded query results, cleared by every write
//! - **Similarity**: exhaustive squared-L2 index with ordinal ↔ memory index mappings
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files and environment variables
//! - [`error`] - The [`StoreError`] taxonomy
//! - [`sparql`] - Transactional query/update executor and the caching layer
//! - [`index`] - Vector similarity index, validation and persistence
//! - [`memory`] - Interaction types, RDF encoding and the memory store coordinator

pub mod config;
pub mod error;
pub mod index;
pub mod memory;
pub mod sparql;

pub use error::{Result, StoreError};
