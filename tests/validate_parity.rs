//! Property tests: `validate` agrees with `configure`, and selection is a
//! pure function of the problem.

mod common;

use common::create_queue;
use gemmkit::gemm::expected_output_shape;
use gemmkit::gemm::heuristics::{HeuristicsRule, TilePair};
use gemmkit::prelude::*;
use proptest::prelude::*;

// ============================================================================
// Problem strategies
// ============================================================================

#[derive(Clone, Debug)]
struct Problem {
    target: GpuTarget,
    dtype: DType,
    batch: usize,
    m: usize,
    n: usize,
    k: usize,
    /// Extra rows on B; non-zero makes K disagree
    k_skew: usize,
    /// Extra columns on the output; non-zero makes the shape wrong
    n_skew: usize,
    bias: bool,
    beta: f32,
    reuse: bool,
    strategy: Option<GemmStrategy>,
    reshaped: Option<TilePair>,
    reshaped_only_rhs: Option<TilePair>,
}

fn arb_target() -> impl Strategy<Value = GpuTarget> {
    prop::sample::select(GpuTarget::ALL.to_vec())
}

fn arb_strategy() -> impl Strategy<Value = Option<GemmStrategy>> {
    prop_oneof![
        2 => Just(None),
        1 => prop::sample::select(GemmStrategy::ALL.to_vec()).prop_map(Some),
    ]
}

/// Tile pairs that are often, but not always, acceptable
fn arb_tiles() -> impl Strategy<Value = Option<TilePair>> {
    let sizes = || prop::sample::select(vec![1usize, 2, 3, 4, 8, 16]);
    let lhs = (0usize..10, sizes(), 0usize..4, any::<bool>(), any::<bool>()).prop_map(
        |(m0, k0, v0, interleave, transpose)| LhsTileConfig {
            m0,
            k0,
            v0,
            interleave,
            transpose,
        },
    );
    let rhs = (sizes(), sizes(), 0usize..4, any::<bool>(), any::<bool>()).prop_map(
        |(n0, k0, h0, interleave, transpose)| RhsTileConfig {
            n0,
            k0,
            h0,
            interleave,
            transpose,
        },
    );
    prop_oneof![
        1 => Just(None),
        2 => (lhs, rhs).prop_map(|(lhs, rhs)| Some(TilePair { lhs, rhs })),
    ]
}

fn arb_problem() -> impl Strategy<Value = Problem> {
    (
        (
            arb_target(),
            prop_oneof![Just(DType::F32), Just(DType::F16)],
            1usize..3,
            1usize..40,
            1usize..40,
            1usize..40,
        ),
        (
            prop_oneof![4 => Just(0usize), 1 => Just(1usize)],
            prop_oneof![4 => Just(0usize), 1 => Just(1usize)],
            any::<bool>(),
            prop_oneof![Just(0.0f32), Just(1.0f32)],
            any::<bool>(),
        ),
        (arb_strategy(), arb_tiles(), arb_tiles()),
    )
        .prop_map(
            |(
                (target, dtype, batch, m, n, k),
                (k_skew, n_skew, bias, beta, reuse),
                (strategy, reshaped, reshaped_only_rhs),
            )| Problem {
                target,
                dtype,
                batch,
                m,
                n,
                k,
                k_skew,
                n_skew,
                bias,
                beta,
                reuse,
                strategy,
                reshaped,
                reshaped_only_rhs,
            },
        )
}

struct Operands {
    a: Tensor,
    b: Tensor,
    c: Option<Tensor>,
    out: Tensor,
    info: GemmInfo,
}

impl Problem {
    fn context(&self) -> GemmContext {
        let (_queue, ctx) = create_queue(self.target);
        let rule = HeuristicsRule {
            strategy: self.strategy,
            reshaped: self.reshaped,
            reshaped_only_rhs: self.reshaped_only_rhs,
            ..Default::default()
        };
        ctx.with_heuristics(Arc::new(HeuristicsTable::new(vec![rule])))
    }

    fn operands(&self) -> Operands {
        let lead: Vec<usize> = if self.batch == 1 { vec![] } else { vec![self.batch] };
        let with_lead = |rows: usize, cols: usize| [lead.as_slice(), &[rows, cols][..]].concat();
        Operands {
            a: Tensor::zeros(&with_lead(self.m, self.k), self.dtype),
            b: Tensor::zeros(&[self.k + self.k_skew, self.n], self.dtype),
            c: self.bias.then(|| Tensor::zeros(&[self.n], self.dtype)),
            out: Tensor::zeros(&with_lead(self.m, self.n + self.n_skew), self.dtype),
            info: GemmInfo::default()
                .with_reshape_rhs_once(self.reuse)
                .with_broadcast_bias(self.bias),
        }
    }
}

fn configure(ctx: GemmContext, p: &Problem, ops: &Operands) -> Result<Gemm> {
    let mut gemm = Gemm::new(ctx);
    gemm.configure(
        &ops.a,
        &ops.b,
        ops.c.as_ref(),
        &ops.out,
        1.0,
        p.beta,
        &ops.info,
    )?;
    Ok(gemm)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn validate_matches_configure(p in arb_problem()) {
        let ctx = p.context();
        let ops = p.operands();
        let c_info = ops.c.as_ref().map(|c| c.info());
        let validated = Gemm::validate(
            &ctx,
            &ops.a.info(),
            &ops.b.info(),
            c_info.as_ref(),
            &ops.out.info(),
            1.0,
            p.beta,
            &ops.info,
        );
        let configured = configure(ctx, &p, &ops);
        prop_assert_eq!(
            validated.is_ok(),
            configured.is_ok(),
            "validate: {:?}, configure: {:?}",
            validated.as_ref().err(),
            configured.as_ref().err()
        );
        if let Ok(gemm) = configured {
            prop_assert_eq!(gemm.state(), LifecycleState::Configured);
        }
    }

    #[test]
    fn selection_is_deterministic(p in arb_problem()) {
        let ops = p.operands();
        let first = configure(p.context(), &p, &ops);
        let second = configure(p.context(), &p, &ops);
        match (first, second) {
            (Ok(x), Ok(y)) => {
                prop_assert_eq!(x.strategy_selection(), y.strategy_selection());
                prop_assert_eq!(x.tile_selection(), y.tile_selection());
            }
            (Err(_), Err(_)) => {}
            (x, y) => prop_assert!(false, "diverged: {:?} / {:?}", x.err(), y.err()),
        }
    }

    #[test]
    fn configured_output_has_expected_shape(p in arb_problem()) {
        let ops = p.operands();
        if configure(p.context(), &p, &ops).is_ok() {
            let expected = expected_output_shape(&ops.a.info(), &ops.b.info(), &ops.info);
            prop_assert_eq!(ops.out.shape(), expected);
            prop_assert_eq!(p.k_skew, 0);
        }
    }

    #[test]
    fn reshaping_strategies_carry_tiles(p in arb_problem()) {
        let ops = p.operands();
        if let Ok(gemm) = configure(p.context(), &p, &ops) {
            let strategy = gemm.strategy().unwrap();
            let reshapes = strategy.reshapes_lhs() || strategy.reshapes_rhs();
            prop_assert_eq!(gemm.tile_selection().is_some(), reshapes);
            let stages = 1
                + usize::from(strategy.reshapes_lhs())
                + usize::from(strategy.reshapes_rhs());
            prop_assert_eq!(gemm.stages().len(), stages);
        }
    }
}
