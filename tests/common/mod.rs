//! Common test utilities
#![allow(dead_code)]

use gemmkit::gemm::heuristics::HeuristicsRule;
use gemmkit::prelude::*;

/// Create a host queue for `target` and a context submitting to it
pub fn create_queue(target: GpuTarget) -> (Arc<HostQueue>, GemmContext) {
    let queue = Arc::new(HostQueue::new(target));
    let ctx = GemmContext::new(queue.clone());
    (queue, ctx)
}

/// Deterministic pseudo-random values in [-1, 1)
pub fn test_data(n: usize, seed: usize) -> Vec<f32> {
    (0..n)
        .map(|i| ((i * 37 + seed * 101 + 11) % 997) as f32 / 498.5 - 1.0)
        .collect()
}

/// F32 tensor filled with [`test_data`]
pub fn test_tensor(shape: &[usize], seed: usize) -> Tensor {
    let n = shape.iter().product();
    Tensor::from_slice(&test_data(n, seed), shape).unwrap()
}

/// Naive `act(alpha * A x B + beta * C)` over `[batch][M][K]` x `[b_batch][K][N]`
///
/// `b_batch` is 1 (shared B) or `batch`. `bias` is either one row of N
/// (broadcast) or a full `[batch][M][N]` matrix.
#[allow(clippy::too_many_arguments)]
pub fn reference_gemm(
    a: &[f32],
    b: &[f32],
    bias: Option<&[f32]>,
    batch: usize,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    beta: f32,
    activation: ActivationInfo,
) -> Vec<f32> {
    let b_batch = b.len() / (k * n);
    let mut out = vec![0.0f32; batch * m * n];
    for bi in 0..batch {
        let b_base = if b_batch == 1 { 0 } else { bi * k * n };
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f32;
                for p in 0..k {
                    acc += a[(bi * m + i) * k + p] * b[b_base + p * n + j];
                }
                let idx = (bi * m + i) * n + j;
                let mut v = alpha * acc;
                if let Some(c) = bias {
                    v += beta * if c.len() == n { c[j] } else { c[idx] };
                }
                out[idx] = activation.apply(v);
            }
        }
    }
    out
}

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Heuristics table that always suggests `strategy`
pub fn force_strategy(strategy: GemmStrategy) -> Arc<dyn LearnedHeuristics> {
    Arc::new(HeuristicsTable::new(vec![HeuristicsRule {
        strategy: Some(strategy),
        ..Default::default()
    }]))
}

/// Configure, run once and wait; returns the planner for inspection
#[allow(clippy::too_many_arguments)]
pub fn run_once(
    queue: &HostQueue,
    ctx: GemmContext,
    a: &Tensor,
    b: &Tensor,
    c: Option<&Tensor>,
    out: &Tensor,
    alpha: f32,
    beta: f32,
    info: &GemmInfo,
) -> Gemm {
    let mut gemm = Gemm::new(ctx);
    gemm.configure(a, b, c, out, alpha, beta, info).unwrap();
    gemm.run().unwrap();
    queue.finish().unwrap();
    gemm
}
