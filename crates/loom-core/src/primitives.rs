//! # Primitives
//!
//! Compiled-in constants of the Loom core. Tunables with these values as
//! defaults live in [`crate::config`].

/// Storage format version written to the metadata keyspace.
///
/// Increment this when making breaking changes to the on-disk layout.
pub const FORMAT_VERSION: u64 = 1;

/// Maximum traversal depth of a graph filter.
///
/// All queries must be computationally bounded.
pub const MAX_TRAVERSAL_DEPTH: usize = 32;

// =============================================================================
// EDGE TYPES WRITTEN BY ENRICHMENT
// =============================================================================

/// Text node -> entity it names.
pub const EDGE_MENTIONS: &str = "MENTIONS";

/// Text node -> semantically close text node.
pub const EDGE_SIMILAR: &str = "IS_SEMANTICALLY_SIMILAR_TO";

/// Summary -> message it covers.
pub const EDGE_SUMMARIZES: &str = "SUMMARIZES";

// =============================================================================
// VECTOR INDEX DEFAULTS
// =============================================================================

/// Maximum links per point on layers above 0. Layer 0 allows twice as many.
pub const DEFAULT_HNSW_M: usize = 16;

/// Candidate list size while inserting.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Candidate list size while searching.
pub const DEFAULT_EF_SEARCH: usize = 64;

/// Highest layer a point can be assigned to.
pub const MAX_HNSW_LEVEL: usize = 16;

/// Tombstone share above which the vector graph is rebuilt.
pub const DEFAULT_COMPACTION_RATIO: f32 = 0.3;

/// Tombstones required before the ratio is considered at all.
pub const DEFAULT_COMPACTION_MIN_TOMBSTONES: usize = 64;

// =============================================================================
// QUERY DEFAULTS
// =============================================================================

/// Candidate sets up to this size are scored exactly instead of via HNSW.
pub const DEFAULT_EXACT_SCAN_LIMIT: usize = 2048;

/// HNSW search breadth multiplier applied to `offset + limit` on filtered searches.
pub const DEFAULT_OVERSAMPLING: usize = 4;

/// Page size when a query sets no limit.
pub const DEFAULT_QUERY_LIMIT: usize = 100;
