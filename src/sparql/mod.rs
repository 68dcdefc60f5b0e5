//! SPARQL 1.1 protocol access: the transactional executor and the caching layer.

pub mod cache;
pub mod executor;

pub use cache::{CachedSparql, QueryCache};
pub use executor::{SparqlExecutor, UpdateAck};
