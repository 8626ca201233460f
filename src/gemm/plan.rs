//! Execution plans
//!
//! A plan is the ordered list of stages a strategy builder produced, plus
//! the scratch memory group those stages draw their buffers from. It is
//! immutable after configuration; the only run-time choice left is which
//! reshaped-RHS-only multiply variant to submit.

use super::weights::ManagedWeights;
use crate::kernels::{
    GemmMatrixMultiplyKernel, GemmMatrixMultiplyReshapedKernel,
    GemmMatrixMultiplyReshapedOnlyRhsKernel, ReshapeLhsKernel, ReshapeRhsKernel,
};
use crate::runtime::{Kernel, MemoryGroup};
use crate::tensor::{Tensor, TensorId};

/// Producer of the reshaped RHS
pub(crate) enum RhsReshape {
    /// Private scratch owned by this plan
    Owned(ReshapeRhsKernel),
    /// Shared entry of a weights manager
    Managed(ManagedWeights),
}

/// Multiply stage of a plan
pub(crate) enum Multiply {
    /// Native or V1 multiply
    Native(GemmMatrixMultiplyKernel),
    /// V2 multiply over both reshaped operands
    Reshaped(GemmMatrixMultiplyReshapedKernel),
    /// RHS-only multiply in both padding variants
    ReshapedOnlyRhs {
        fast: GemmMatrixMultiplyReshapedOnlyRhsKernel,
        padded: GemmMatrixMultiplyReshapedOnlyRhsKernel,
        lhs: Tensor,
        out: Tensor,
    },
}

impl Multiply {
    /// Kernel to submit given the current padding of the operands
    pub fn select(&self) -> &dyn Kernel {
        match self {
            Self::Native(k) => k,
            Self::Reshaped(k) => k,
            Self::ReshapedOnlyRhs {
                fast,
                padded,
                lhs,
                out,
            } => {
                if lhs.padding().cross_plane() == 0 && out.padding().cross_plane() == 0 {
                    fast
                } else {
                    padded
                }
            }
        }
    }
}

/// One stage of a plan
pub(crate) enum Stage {
    ReshapeLhs(ReshapeLhsKernel),
    ReshapeRhs(RhsReshape),
    Multiply(Multiply),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::ReshapeLhs(k) => k.name(),
            Self::ReshapeRhs(RhsReshape::Owned(k)) => k.name(),
            Self::ReshapeRhs(RhsReshape::Managed(w)) => w.producer().name(),
            Self::Multiply(Multiply::ReshapedOnlyRhs { padded, .. }) => padded.name(),
            Self::Multiply(m) => m.select().name(),
        }
    }

    fn alternative(&self) -> Option<&'static str> {
        match self {
            Self::Multiply(Multiply::ReshapedOnlyRhs { fast, .. }) => Some(fast.name()),
            _ => None,
        }
    }
}

/// Public description of one plan stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageInfo {
    /// Kernel submitted for this stage
    pub kernel: &'static str,
    /// Variant submitted instead when the operands carry no cross-plane padding
    pub fast_variant: Option<&'static str>,
    /// Tensors the stage reads
    pub inputs: Vec<TensorId>,
    /// Tensor the stage writes
    pub output: TensorId,
    /// Whether the output is shared through a weights manager
    pub shared: bool,
}

/// Stages and scratch memory of one configured GEMM
pub(crate) struct ExecutionPlan {
    pub stages: Vec<Stage>,
    pub memory: MemoryGroup,
    descriptions: Vec<StageInfo>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            memory: MemoryGroup::new(),
            descriptions: Vec::new(),
        }
    }

    /// Append a stage
    pub fn push(&mut self, stage: Stage, inputs: &[&Tensor], output: &Tensor) {
        self.descriptions.push(StageInfo {
            kernel: stage.name(),
            fast_variant: stage.alternative(),
            inputs: inputs.iter().map(|t| t.id()).collect(),
            output: output.id(),
            shared: matches!(stage, Stage::ReshapeRhs(RhsReshape::Managed(_))),
        });
        self.stages.push(stage);
    }

    /// RHS reshape stage, if the strategy has one
    pub fn rhs_reshape(&self) -> Option<&RhsReshape> {
        self.stages.iter().find_map(|s| match s {
            Stage::ReshapeRhs(r) => Some(r),
            _ => None,
        })
    }

    /// Shared weights this plan consumes
    pub fn managed_weights(&self) -> Option<&ManagedWeights> {
        match self.rhs_reshape() {
            Some(RhsReshape::Managed(w)) => Some(w),
            _ => None,
        }
    }

    /// Stage descriptions in submission order
    pub fn describe(&self) -> &[StageInfo] {
        &self.descriptions
    }
}
