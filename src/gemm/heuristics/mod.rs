//! Two-tier heuristic selection
//!
//! Every decision (strategy, then tiles for the chosen strategy) goes through
//! the same sequence:
//!
//! ```text
//! learned backend ──► candidate ──► speculative validation ──ok──► commit
//!        │                                   │
//!        └── no suggestion ──────────────────┴──fail──► default table ──► commit
//! ```
//!
//! The default tables in [`default`] always produce a feasible answer for
//! supported inputs, so they are committed without validation. A rejected
//! learned candidate is discarded whole; it is never merged with the
//! default answer.

pub mod default;
mod learned;

pub use learned::{HEURISTICS_ENV, HeuristicsRule, HeuristicsTable, LearnedHeuristics, TilePair};

use crate::error::Result;
use crate::gemm::query::ProblemQuery;
use crate::gemm::strategy::GemmStrategy;
use crate::gemm::tiling::{LhsTileConfig, RhsTileConfig};
use std::fmt;

/// Tier that produced a decision
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// Learned backend, validated
    Learned,
    /// Fixed default table
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Learned => "learned",
            Self::Default => "default",
        })
    }
}

/// A committed decision and the tier it came from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Selection<T> {
    /// Decision
    pub value: T,
    /// Tier that produced it
    pub source: Source,
}

/// Tile pair for strategies that reshape
pub type TileConfigs = (LhsTileConfig, RhsTileConfig);

fn two_tier<T: fmt::Debug>(
    what: &str,
    query: &ProblemQuery,
    candidate: Option<T>,
    check: impl FnOnce(&T) -> Result<()>,
    fallback: impl FnOnce() -> T,
) -> Selection<T> {
    if let Some(value) = candidate {
        match check(&value) {
            Ok(()) => {
                log::info!("{what} for {query:?}: learned {value:?}");
                return Selection {
                    value,
                    source: Source::Learned,
                };
            }
            Err(err) => {
                log::warn!("discarding learned {what} {value:?} for {query:?}: {err}");
            }
        }
    }
    let value = fallback();
    log::info!("{what} for {query:?}: default {value:?}");
    Selection {
        value,
        source: Source::Default,
    }
}

/// Pick the execution strategy
///
/// `check` is the full feasibility check of a strategy (including its own
/// tile selection); it only runs on learned candidates. Learned candidates
/// for non-float element types are rejected outright.
pub fn select_strategy(
    query: &ProblemQuery,
    learned: Option<&dyn LearnedHeuristics>,
    check: impl FnOnce(GemmStrategy) -> Result<()>,
) -> Selection<GemmStrategy> {
    let candidate = learned
        .filter(|_| query.dtype.is_float())
        .and_then(|h| h.kernel_type(query));
    two_tier("strategy", query, candidate, |s| check(*s), || {
        default::strategy(query)
    })
}

/// Pick tiles for the reshaped (V2) strategy
pub fn select_reshaped_tiles(
    query: &ProblemQuery,
    learned: Option<&dyn LearnedHeuristics>,
    check: impl FnOnce(&LhsTileConfig, &RhsTileConfig) -> Result<()>,
) -> Selection<TileConfigs> {
    let candidate = learned.and_then(|h| h.config_reshaped(query));
    two_tier(
        "reshaped tiles",
        query,
        candidate,
        |(lhs, rhs)| check(lhs, rhs),
        || default::config_reshaped(query),
    )
}

/// Pick tiles for the reshaped-RHS-only strategy
pub fn select_reshaped_only_rhs_tiles(
    query: &ProblemQuery,
    learned: Option<&dyn LearnedHeuristics>,
    check: impl FnOnce(&LhsTileConfig, &RhsTileConfig) -> Result<()>,
) -> Selection<TileConfigs> {
    let candidate = learned.and_then(|h| h.config_reshaped_only_rhs(query));
    two_tier(
        "reshaped-only-rhs tiles",
        query,
        candidate,
        |(lhs, rhs)| check(lhs, rhs),
        || default::config_reshaped_only_rhs(query),
    )
}
