//! GEMM planning and execution
//!
//! [`Gemm`] is the execution controller. Configuration runs once:
//!
//! ```text
//! configure(A, B, C?, out, alpha, beta, info)
//!   ├── operand checks            (shapes, types, bias rules)
//!   ├── ProblemQuery              (M, N, K, batch, target, reuse flag)
//!   ├── strategy selection        (learned ─validate─► default)
//!   ├── tile selection            (learned ─validate─► default)
//!   ├── authoritative validation  (every stage, concrete infos)
//!   └── strategy builder          (stages + scratch registration)
//! ```
//!
//! [`Gemm::validate`] runs the same sequence without building, so it
//! succeeds exactly when `configure` would.
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured ──configure──► Configured ──prepare (or first run)──► Prepared
//! ```
//!
//! `prepare` reshapes a reused RHS once, marks the original RHS unused and
//! synchronizes the queue. `run` enqueues the remaining stages and returns
//! without waiting for them.

pub mod heuristics;
mod info;
mod plan;
mod query;
mod strategy;
pub mod tiling;
mod weights;

pub use heuristics::{HeuristicsTable, LearnedHeuristics, Selection, Source};
pub use info::{ActivationInfo, GemmInfo, GemmKernelInfo};
pub use plan::StageInfo;
pub use query::{ProblemQuery, expected_output_shape};
pub use strategy::GemmStrategy;
pub use tiling::{LhsTileConfig, RhsTileConfig};
pub use weights::{ManagedWeights, WeightsKey, WeightsManager};

use crate::error::{Error, Result};
use crate::runtime::{CommandQueue, GpuTarget};
use crate::tensor::{Tensor, TensorInfo};
use heuristics::TileConfigs;
use plan::{ExecutionPlan, RhsReshape, Stage};
use std::fmt;
use std::sync::Arc;
use strategy::{Operands, Tensors};

// ============================================================================
// Context
// ============================================================================

/// Collaborators injected into a planner
#[derive(Clone)]
pub struct GemmContext {
    queue: Arc<dyn CommandQueue>,
    weights_manager: Option<Arc<WeightsManager>>,
    heuristics: Option<Arc<dyn LearnedHeuristics>>,
}

impl GemmContext {
    /// Context submitting to `queue`, with default heuristics and no
    /// weights sharing
    pub fn new(queue: Arc<dyn CommandQueue>) -> Self {
        Self {
            queue,
            weights_manager: None,
            heuristics: None,
        }
    }

    /// Share reshaped weights through `manager`
    pub fn with_weights_manager(mut self, manager: Arc<WeightsManager>) -> Self {
        self.weights_manager = Some(manager);
        self
    }

    /// Consult `heuristics` before the default tables
    pub fn with_heuristics(mut self, heuristics: Arc<dyn LearnedHeuristics>) -> Self {
        self.heuristics = Some(heuristics);
        self
    }

    /// Command queue
    pub fn queue(&self) -> &Arc<dyn CommandQueue> {
        &self.queue
    }

    /// Device the plans target
    pub fn target(&self) -> GpuTarget {
        self.queue.target()
    }

    /// Weights manager, if any
    pub fn weights_manager(&self) -> Option<&Arc<WeightsManager>> {
        self.weights_manager.as_ref()
    }

    fn learned(&self) -> Option<&dyn LearnedHeuristics> {
        self.heuristics.as_deref()
    }
}

impl fmt::Debug for GemmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GemmContext")
            .field("target", &self.target())
            .field("weights_manager", &self.weights_manager)
            .field("learned_heuristics", &self.heuristics.is_some())
            .finish()
    }
}

// ============================================================================
// Selection shared by validate and configure
// ============================================================================

/// Every decision configuration commits to
#[derive(Clone, Debug)]
struct Decision {
    query: ProblemQuery,
    strategy: Selection<GemmStrategy>,
    tiles: Option<Selection<TileConfigs>>,
}

fn decide(ctx: &GemmContext, ops: &Operands<'_>) -> Result<Decision> {
    query::validate_operands(ops.a, ops.b, ops.bias(), ops.out, ops.info)?;
    let q = ProblemQuery::from_operands(ctx.target(), ops.a, ops.b, ops.info);
    let learned = ctx.learned();

    let strategy = heuristics::select_strategy(&q, learned, |candidate| {
        let tiles = strategy::select_tiles(candidate, &q, ops, learned);
        strategy::validate(candidate, &q, ops, tiles.as_ref().map(|t| &t.value))
    });
    let tiles = strategy::select_tiles(strategy.value, &q, ops, learned);
    strategy::validate(strategy.value, &q, ops, tiles.as_ref().map(|t| &t.value))?;

    Ok(Decision {
        query: q,
        strategy,
        tiles,
    })
}

// ============================================================================
// Controller
// ============================================================================

/// Lifecycle of a [`Gemm`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No successful `configure` yet
    Unconfigured,
    /// Plan built, one-time work pending
    Configured,
    /// One-time work done
    Prepared,
}

struct Configured {
    decision: Decision,
    plan: ExecutionPlan,
    b: Tensor,
    reshape_rhs_once: bool,
}

/// GEMM execution controller
///
/// Computes `out = act(alpha * A x B + beta * C)` through the plan chosen
/// at configuration time.
pub struct Gemm {
    ctx: GemmContext,
    state: LifecycleState,
    configured: Option<Configured>,
}

impl Gemm {
    /// Unconfigured planner
    pub fn new(ctx: GemmContext) -> Self {
        Self {
            ctx,
            state: LifecycleState::Unconfigured,
            configured: None,
        }
    }

    /// Check whether [`Self::configure`] would succeed with these operands
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        ctx: &GemmContext,
        a: &TensorInfo,
        b: &TensorInfo,
        c: Option<&TensorInfo>,
        out: &TensorInfo,
        alpha: f32,
        beta: f32,
        info: &GemmInfo,
    ) -> Result<()> {
        let ops = Operands {
            a,
            b,
            c,
            out,
            alpha,
            beta,
            info,
        };
        decide(ctx, &ops).map(|_| ())
    }

    /// Select a strategy and build its plan
    ///
    /// May be called once. On failure the planner stays unconfigured.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &mut self,
        a: &Tensor,
        b: &Tensor,
        c: Option<&Tensor>,
        out: &Tensor,
        alpha: f32,
        beta: f32,
        info: &GemmInfo,
    ) -> Result<()> {
        if self.state != LifecycleState::Unconfigured {
            return Err(Error::AlreadyConfigured);
        }

        let (a_info, b_info, out_info) = (a.info(), b.info(), out.info());
        let c_info = c.map(Tensor::info);
        let ops = Operands {
            a: &a_info,
            b: &b_info,
            c: c_info.as_ref(),
            out: &out_info,
            alpha,
            beta,
            info,
        };
        let decision = decide(&self.ctx, &ops)?;

        let tensors = Tensors {
            a,
            b,
            c,
            out,
            alpha,
            beta,
            info,
        };
        let plan = strategy::build(
            decision.strategy.value,
            &decision.query,
            &tensors,
            decision.tiles.as_ref().map(|t| &t.value),
            self.ctx.weights_manager.as_deref(),
        )?;

        log::info!(
            "configured {} gemm ({} tier) for {:?}",
            decision.strategy.value,
            decision.strategy.source,
            decision.query
        );
        self.state = if info.retain_internal_weights {
            LifecycleState::Prepared
        } else {
            LifecycleState::Configured
        };
        self.configured = Some(Configured {
            decision,
            plan,
            b: b.clone(),
            reshape_rhs_once: info.reshape_rhs_once,
        });
        Ok(())
    }

    /// One-time setup; later calls do nothing
    ///
    /// When the RHS is reused, reshapes it (through the weights manager if
    /// it is managed) and waits for the queue to drain. A private RHS is then
    /// marked unused; a managed one stays in use for its other consumers.
    pub fn prepare(&mut self) -> Result<()> {
        let configured = match self.state {
            LifecycleState::Unconfigured => return Err(Error::NotConfigured),
            LifecycleState::Prepared => return Ok(()),
            LifecycleState::Configured => self.configured.as_ref().ok_or(Error::NotConfigured)?,
        };

        if configured.reshape_rhs_once
            && let Some(reshape) = configured.plan.rhs_reshape()
        {
            let queue = self.ctx.queue.as_ref();
            configured.plan.memory.acquire_persistent(queue.allocator())?;
            self.reshape_rhs(reshape)?;
            if matches!(reshape, RhsReshape::Owned(_)) {
                configured.b.mark_as_unused();
            }
            queue.finish()?;
        }

        self.state = LifecycleState::Prepared;
        Ok(())
    }

    /// Enqueue one execution of the plan
    ///
    /// Prepares first if needed. Returns once every stage is submitted;
    /// call `finish` on the queue to wait for the result.
    pub fn run(&mut self) -> Result<()> {
        self.prepare()?;
        let configured = self.configured.as_ref().ok_or(Error::NotConfigured)?;
        let queue = self.ctx.queue.as_ref();

        let _scope = configured.plan.memory.scope(queue.allocator())?;
        for stage in &configured.plan.stages {
            match stage {
                Stage::ReshapeLhs(kernel) => queue.enqueue(kernel, false)?,
                // A managed copy is produced again after an invalidate,
                // even when the RHS is reshaped only once
                Stage::ReshapeRhs(reshape @ RhsReshape::Managed(_)) => {
                    if self.reshape_rhs(reshape)? && configured.reshape_rhs_once {
                        queue.finish()?;
                    }
                }
                Stage::ReshapeRhs(reshape) => {
                    if !configured.reshape_rhs_once {
                        self.reshape_rhs(reshape)?;
                    }
                }
                Stage::Multiply(multiply) => queue.enqueue(multiply.select(), true)?,
            }
        }
        Ok(())
    }

    /// Enqueue the RHS reshape; returns whether a producer was submitted
    fn reshape_rhs(&self, reshape: &RhsReshape) -> Result<bool> {
        let queue = self.ctx.queue.as_ref();
        match reshape {
            RhsReshape::Owned(kernel) => queue.enqueue(kernel, false).map(|_| true),
            RhsReshape::Managed(weights) => {
                let manager = self.ctx.weights_manager.as_ref().ok_or_else(|| {
                    Error::Internal("managed weights without a weights manager".to_string())
                })?;
                manager.run(weights, queue)
            }
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Injected collaborators
    pub fn context(&self) -> &GemmContext {
        &self.ctx
    }

    /// Problem the plan was built for
    pub fn query(&self) -> Option<&ProblemQuery> {
        self.configured.as_ref().map(|c| &c.decision.query)
    }

    /// Selected strategy
    pub fn strategy(&self) -> Option<GemmStrategy> {
        self.configured.as_ref().map(|c| c.decision.strategy.value)
    }

    /// Selected strategy and the tier that produced it
    pub fn strategy_selection(&self) -> Option<Selection<GemmStrategy>> {
        self.configured.as_ref().map(|c| c.decision.strategy)
    }

    /// Tiles of a reshaping strategy and the tier that produced them
    pub fn tile_selection(&self) -> Option<Selection<TileConfigs>> {
        self.configured.as_ref().and_then(|c| c.decision.tiles)
    }

    /// LHS tiling, if the strategy reshapes
    pub fn lhs_tile_config(&self) -> Option<LhsTileConfig> {
        self.tile_selection().map(|s| s.value.0)
    }

    /// RHS tiling, if the strategy reshapes
    pub fn rhs_tile_config(&self) -> Option<RhsTileConfig> {
        self.tile_selection().map(|s| s.value.1)
    }

    /// Stages in submission order
    pub fn stages(&self) -> &[StageInfo] {
        self.configured
            .as_ref()
            .map(|c| c.plan.describe())
            .unwrap_or_default()
    }
}

impl Drop for Gemm {
    fn drop(&mut self) {
        if let (Some(configured), Some(manager)) = (&self.configured, &self.ctx.weights_manager)
            && let Some(weights) = configured.plan.managed_weights()
        {
            manager.release(weights);
        }
    }
}

impl fmt::Debug for Gemm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gemm")
            .field("state", &self.state)
            .field("strategy", &self.strategy())
            .field("stages", &self.stages())
            .finish()
    }
}
