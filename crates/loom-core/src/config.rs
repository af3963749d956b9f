//! # Store Configuration
//!
//! Serde structs with defaults; every field may be omitted in a config file.

use crate::index::DistanceMetric;
use crate::primitives::{
    DEFAULT_COMPACTION_MIN_TOMBSTONES, DEFAULT_COMPACTION_RATIO, DEFAULT_EF_CONSTRUCTION,
    DEFAULT_EF_SEARCH, DEFAULT_EXACT_SCAN_LIMIT, DEFAULT_HNSW_M, DEFAULT_OVERSAMPLING,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration of a [`crate::Store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub hnsw: HnswConfig,
    pub query: QueryConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hnsw.validate()?;
        self.query.validate()
    }
}

/// Vector index parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum links per point per layer (`2 * m` on layer 0).
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: DistanceMetric,
    /// Rebuild the graph once this share of points is tombstoned.
    pub compaction_ratio: f32,
    pub compaction_min_tombstones: usize,
    /// Run compaction automatically after commits.
    pub auto_compact: bool,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: DEFAULT_HNSW_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            metric: DistanceMetric::Cosine,
            compaction_ratio: DEFAULT_COMPACTION_RATIO,
            compaction_min_tombstones: DEFAULT_COMPACTION_MIN_TOMBSTONES,
            auto_compact: true,
        }
    }
}

impl HnswConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.m < 2 {
            return Err(ConfigError::Invalid {
                field: "hnsw.m",
                reason: "must be at least 2".to_string(),
            });
        }
        if self.ef_construction < self.m {
            return Err(ConfigError::Invalid {
                field: "hnsw.ef_construction",
                reason: format!("must be at least m ({})", self.m),
            });
        }
        if self.ef_search == 0 {
            return Err(ConfigError::Invalid {
                field: "hnsw.ef_search",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "hnsw.compaction_ratio",
                reason: format!("{} is outside (0, 1]", self.compaction_ratio),
            });
        }
        Ok(())
    }
}

/// Converged query tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Candidate sets up to this size are ranked by exact scoring.
    pub exact_scan_limit: usize,
    /// Extra HNSW breadth for filtered searches.
    pub oversampling: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            exact_scan_limit: DEFAULT_EXACT_SCAN_LIMIT,
            oversampling: DEFAULT_OVERSAMPLING,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oversampling == 0 {
            return Err(ConfigError::Invalid {
                field: "query.oversampling",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_tiny_m() {
        let config = HnswConfig {
            m: 1,
            ..HnswConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "hnsw.m", .. })
        ));
    }

    #[test]
    fn rejects_zero_compaction_ratio() {
        let config = HnswConfig {
            compaction_ratio: 0.0,
            ..HnswConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
