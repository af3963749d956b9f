//! Converged query vocabulary.

use crate::primitives::DEFAULT_QUERY_LIMIT;
use crate::types::{Direction, Edge, FieldValue, Node, NodeId};
use serde::{Deserialize, Serialize};

pub use crate::index::FilterOperator;

/// `field op value` over an indexed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralFilter {
    /// Indexed field name, e.g. `chat_id`.
    pub field: String,
    pub operator: FilterOperator,
    pub value: FieldValue,
}

impl StructuralFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Equality filter.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }
}

/// Nodes reachable from a start node within `depth` hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFilter {
    pub start_node_id: NodeId,
    pub direction: Direction,
    /// Follow only edges of this type.
    pub edge_type: Option<String>,
    pub depth: usize,
}

impl GraphFilter {
    #[must_use]
    pub fn new(start_node_id: impl Into<NodeId>, direction: Direction, depth: usize) -> Self {
        Self {
            start_node_id: start_node_id.into(),
            direction,
            edge_type: None,
            depth,
        }
    }

    #[must_use]
    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }
}

/// Rank by similarity to `vector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticQuery {
    pub vector: Vec<f32>,
    /// Drop results scoring below this.
    pub similarity_threshold: Option<f32>,
}

/// A query combining structural, graph and semantic facets.
///
/// A missing facet places no constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergedQuery {
    pub structural_filters: Vec<StructuralFilter>,
    pub graph_filter: Option<GraphFilter>,
    pub semantic_query: Option<SemanticQuery>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ConvergedQuery {
    fn default() -> Self {
        Self {
            structural_filters: Vec::new(),
            graph_filter: None,
            semantic_query: None,
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

impl ConvergedQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: StructuralFilter) -> Self {
        self.structural_filters.push(filter);
        self
    }

    #[must_use]
    pub fn graph(mut self, filter: GraphFilter) -> Self {
        self.graph_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn semantic(mut self, vector: Vec<f32>, similarity_threshold: Option<f32>) -> Self {
        self.semantic_query = Some(SemanticQuery {
            vector,
            similarity_threshold,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub node: Node,
    /// Present when the query had a semantic facet.
    pub similarity_score: Option<f32>,
}

/// A walk through the graph: `nodes[i]` and `nodes[i + 1]` are joined by `edges[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Path {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
