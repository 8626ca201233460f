//! Learned (data-driven) heuristics backends
//!
//! A backend may return a suggestion or nothing for any query. Suggestions
//! are never trusted: the selector validates each one against the stages it
//! would configure and falls back to the default tables on failure.
//!
//! # Table format
//!
//! [`HeuristicsTable`] reads a JSON document of first-match rules:
//!
//! ```json
//! {
//!   "rules": [
//!     {
//!       "arch": "bifrost",
//!       "dtype": "f32",
//!       "m": [1, 1],
//!       "strategy": "reshaped_only_rhs",
//!       "reshaped_only_rhs": {
//!         "lhs": { "m0": 1, "k0": 8, "v0": 1 },
//!         "rhs": { "n0": 2, "k0": 8, "h0": 8, "interleave": true, "transpose": true }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Omitted match fields match anything; ranges are inclusive.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::gemm::query::ProblemQuery;
use crate::gemm::strategy::GemmStrategy;
use crate::gemm::tiling::{LhsTileConfig, RhsTileConfig};
use crate::runtime::{GpuArch, GpuTarget};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming a JSON table for [`HeuristicsTable::from_env`]
pub const HEURISTICS_ENV: &str = "GEMMKIT_HEURISTICS";

/// Source of learned suggestions
///
/// Implementations must be deterministic: the same query always yields the
/// same answer.
pub trait LearnedHeuristics: Send + Sync {
    /// Suggested strategy
    fn kernel_type(&self, query: &ProblemQuery) -> Option<GemmStrategy>;

    /// Suggested tiling for the reshaped (V2) strategy
    fn config_reshaped(&self, query: &ProblemQuery) -> Option<(LhsTileConfig, RhsTileConfig)>;

    /// Suggested tiling for the reshaped-RHS-only strategy
    fn config_reshaped_only_rhs(
        &self,
        query: &ProblemQuery,
    ) -> Option<(LhsTileConfig, RhsTileConfig)>;
}

/// Tile pair as stored in a table
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TilePair {
    /// LHS tiling
    pub lhs: LhsTileConfig,
    /// RHS tiling
    pub rhs: RhsTileConfig,
}

/// One first-match rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeuristicsRule {
    /// Exact target
    pub target: Option<GpuTarget>,
    /// Architecture family
    pub arch: Option<GpuArch>,
    /// Element type
    pub dtype: Option<DType>,
    /// Inclusive M range
    pub m: Option<[usize; 2]>,
    /// Inclusive N range
    pub n: Option<[usize; 2]>,
    /// Inclusive K range
    pub k: Option<[usize; 2]>,
    /// Inclusive batch range
    pub batch: Option<[usize; 2]>,
    /// Reshape-RHS-once flag
    pub reshape_rhs_once: Option<bool>,
    /// Strategy to suggest
    pub strategy: Option<GemmStrategy>,
    /// Tiling to suggest for the reshaped strategy
    pub reshaped: Option<TilePair>,
    /// Tiling to suggest for the reshaped-RHS-only strategy
    pub reshaped_only_rhs: Option<TilePair>,
}

fn in_range(range: Option<[usize; 2]>, value: usize) -> bool {
    range.is_none_or(|[lo, hi]| lo <= value && value <= hi)
}

impl HeuristicsRule {
    /// Whether every present condition holds for `q`
    pub fn matches(&self, q: &ProblemQuery) -> bool {
        self.target.is_none_or(|t| t == q.target)
            && self.arch.is_none_or(|a| a == q.arch())
            && self.dtype.is_none_or(|d| d == q.dtype)
            && self.reshape_rhs_once.is_none_or(|r| r == q.reshape_rhs_once)
            && in_range(self.m, q.m)
            && in_range(self.n, q.n)
            && in_range(self.k, q.k)
            && in_range(self.batch, q.batch_size)
    }
}

/// Rule table loaded from JSON
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicsTable {
    /// Rules in priority order
    pub rules: Vec<HeuristicsRule>,
}

impl HeuristicsTable {
    /// Table from rules
    pub fn new(rules: Vec<HeuristicsRule>) -> Self {
        Self { rules }
    }

    /// Parse a JSON table
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.check()?;
        Ok(table)
    }

    /// Read and parse a JSON table file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&json)?;
        log::info!(
            "loaded {} heuristics rules from {}",
            table.rules.len(),
            path.display()
        );
        Ok(table)
    }

    /// Load the table named by `GEMMKIT_HEURISTICS`, if set
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var_os(HEURISTICS_ENV) {
            Some(path) => Self::from_path(path).map(Some),
            None => Ok(None),
        }
    }

    fn check(&self) -> Result<()> {
        for (i, rule) in self.rules.iter().enumerate() {
            for (name, range) in [("m", rule.m), ("n", rule.n), ("k", rule.k), ("batch", rule.batch)] {
                if let Some([lo, hi]) = range
                    && lo > hi
                {
                    return Err(Error::Heuristics(format!(
                        "rule {i}: empty {name} range [{lo}, {hi}]"
                    )));
                }
            }
        }
        Ok(())
    }

    fn first<T>(&self, q: &ProblemQuery, pick: impl Fn(&HeuristicsRule) -> Option<T>) -> Option<T> {
        self.rules
            .iter()
            .filter(|r| r.matches(q))
            .find_map(pick)
    }
}

impl LearnedHeuristics for HeuristicsTable {
    fn kernel_type(&self, query: &ProblemQuery) -> Option<GemmStrategy> {
        self.first(query, |r| r.strategy)
    }

    fn config_reshaped(&self, query: &ProblemQuery) -> Option<(LhsTileConfig, RhsTileConfig)> {
        self.first(query, |r| r.reshaped.map(|p| (p.lhs, p.rhs)))
    }

    fn config_reshaped_only_rhs(
        &self,
        query: &ProblemQuery,
    ) -> Option<(LhsTileConfig, RhsTileConfig)> {
        self.first(query, |r| r.reshaped_only_rhs.map(|p| (p.lhs, p.rhs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "rules": [
            { "target": "G76", "dtype": "f16", "strategy": "native" },
            {
                "arch": "bifrost",
                "m": [1, 1],
                "strategy": "reshaped_only_rhs",
                "reshaped_only_rhs": {
                    "lhs": { "m0": 1, "k0": 8, "v0": 1 },
                    "rhs": { "n0": 2, "k0": 8, "h0": 8, "interleave": true, "transpose": true }
                }
            },
            { "arch": "bifrost", "strategy": "reshaped" }
        ]
    }"#;

    fn query(target: GpuTarget, dtype: DType, m: usize) -> ProblemQuery {
        ProblemQuery {
            target,
            dtype,
            m,
            n: 32,
            k: 32,
            batch_size: 1,
            reshape_rhs_once: true,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let table = HeuristicsTable::from_json_str(TABLE).unwrap();
        assert_eq!(
            table.kernel_type(&query(GpuTarget::G76, DType::F16, 1)),
            Some(GemmStrategy::Native)
        );
        assert_eq!(
            table.kernel_type(&query(GpuTarget::G71, DType::F32, 1)),
            Some(GemmStrategy::ReshapedOnlyRhs)
        );
        assert_eq!(
            table.kernel_type(&query(GpuTarget::G71, DType::F32, 8)),
            Some(GemmStrategy::Reshaped)
        );
        assert_eq!(table.kernel_type(&query(GpuTarget::G78, DType::F32, 8)), None);
    }

    #[test]
    fn test_tile_lookup_skips_rules_without_tiles() {
        let table = HeuristicsTable::from_json_str(TABLE).unwrap();
        let (lhs, rhs) = table
            .config_reshaped_only_rhs(&query(GpuTarget::G52, DType::F32, 1))
            .unwrap();
        assert_eq!(lhs.k0, 8);
        assert!(rhs.transpose);
        assert!(
            table
                .config_reshaped(&query(GpuTarget::G52, DType::F32, 8))
                .is_none()
        );
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert!(matches!(
            HeuristicsTable::from_json_str(r#"{"rules":[{"m":[9,3]}]}"#),
            Err(Error::Heuristics(_))
        ));
        assert!(matches!(
            HeuristicsTable::from_json_str(r#"{"rules":[{"colour":"blue"}]}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = HeuristicsTable::from_path("/nonexistent/gemmkit.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
