//! Enrichment modules. Each one reads what it needs, calls the ML capability
//! outside any transaction, then commits its result in a single write.

pub mod associative_linker;
pub mod entity_linker;
pub mod semantic_indexer;
pub mod summarizer;
