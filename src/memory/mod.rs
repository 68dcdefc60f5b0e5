pub mod rdf;
pub mod store;
pub mod types;

pub use store::{SimilarityHit, SparqlMemoryStore};
pub use types::{Interaction, MemorySnapshot, MemoryType};
