#![allow(dead_code)]

use fluxbench::{Bencher, flux};
use std::hint::black_box;

use gemmkit::gemm::heuristics::HeuristicsRule;
use gemmkit::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rand_vec_f32(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| ((i * 17 + 3) % 1000) as f32 / 1000.0)
        .collect()
}

fn forced(strategy: GemmStrategy) -> Arc<dyn LearnedHeuristics> {
    Arc::new(HeuristicsTable::new(vec![HeuristicsRule {
        strategy: Some(strategy),
        ..Default::default()
    }]))
}

struct Setup {
    queue: Arc<HostQueue>,
    gemm: Gemm,
    out: Tensor,
}

fn setup(target: GpuTarget, strategy: Option<GemmStrategy>, size: usize) -> Setup {
    let queue = Arc::new(HostQueue::new(target));
    let mut ctx = GemmContext::new(queue.clone());
    if let Some(strategy) = strategy {
        ctx = ctx.with_heuristics(forced(strategy));
    }
    let a = Tensor::from_slice(&rand_vec_f32(size * size), &[size, size]).unwrap();
    let b = Tensor::from_slice(&rand_vec_f32(size * size), &[size, size]).unwrap();
    let out = Tensor::zeros(&[size, size], DType::F32);

    let mut gemm = Gemm::new(ctx);
    gemm.configure(
        &a,
        &b,
        None,
        &out,
        1.0,
        0.0,
        &GemmInfo::default().with_reshape_rhs_once(true),
    )
    .unwrap();
    gemm.prepare().unwrap();
    queue.finish().unwrap();
    Setup { queue, gemm, out }
}

fn run(s: &mut Setup) {
    s.gemm.run().unwrap();
    s.queue.finish().unwrap();
}

// ---------------------------------------------------------------------------
// Run: one strategy per group (parameterized)
// ---------------------------------------------------------------------------

#[flux::bench(group = "gemm_run_f32", args = [32, 128, 256])]
fn native_run(b: &mut Bencher, size: usize) {
    let mut s = setup(GpuTarget::G71, Some(GemmStrategy::Native), size);
    b.iter(|| {
        run(&mut s);
        black_box(&s.out);
    });
}

#[flux::bench(group = "gemm_run_f32", args = [32, 128, 256])]
fn reshaped_v1_run(b: &mut Bencher, size: usize) {
    let mut s = setup(GpuTarget::G71, Some(GemmStrategy::ReshapedV1), size);
    b.iter(|| {
        run(&mut s);
        black_box(&s.out);
    });
}

#[flux::bench(group = "gemm_run_f32", args = [32, 128, 256])]
fn reshaped_run(b: &mut Bencher, size: usize) {
    let mut s = setup(GpuTarget::G71, Some(GemmStrategy::Reshaped), size);
    b.iter(|| {
        run(&mut s);
        black_box(&s.out);
    });
}

#[flux::bench(group = "gemm_run_f32", args = [32, 128, 256])]
fn reshaped_only_rhs_run(b: &mut Bencher, size: usize) {
    let mut s = setup(GpuTarget::G71, Some(GemmStrategy::ReshapedOnlyRhs), size);
    b.iter(|| {
        run(&mut s);
        black_box(&s.out);
    });
}

// ---------------------------------------------------------------------------
// Run: default selection per architecture
// ---------------------------------------------------------------------------

#[flux::bench(group = "gemm_default_f32")]
fn midgard_t800_128(b: &mut Bencher) {
    let mut s = setup(GpuTarget::T800, None, 128);
    b.iter(|| run(&mut s));
}

#[flux::bench(group = "gemm_default_f32")]
fn bifrost_g76_128(b: &mut Bencher) {
    let mut s = setup(GpuTarget::G76, None, 128);
    b.iter(|| run(&mut s));
}

#[flux::bench(group = "gemm_default_f32")]
fn valhall_g78_128(b: &mut Bencher) {
    let mut s = setup(GpuTarget::G78, None, 128);
    b.iter(|| run(&mut s));
}

// ---------------------------------------------------------------------------
// Planning: heuristics and stage configuration only
// ---------------------------------------------------------------------------

#[flux::bench(group = "gemm_configure", args = [64, 1024])]
fn configure_default(b: &mut Bencher, size: usize) {
    let queue = Arc::new(HostQueue::new(GpuTarget::G71));
    let ctx = GemmContext::new(queue);
    let a = Tensor::zeros(&[size, size], DType::F32);
    let bm = Tensor::zeros(&[size, size], DType::F32);
    let out = Tensor::zeros(&[size, size], DType::F32);
    let info = GemmInfo::default().with_reshape_rhs_once(true);
    b.iter(|| {
        let mut gemm = Gemm::new(ctx.clone());
        gemm.configure(&a, &bm, None, &out, 1.0, 0.0, &info).unwrap();
        black_box(gemm.strategy())
    });
}

#[flux::bench(group = "gemm_configure", args = [64, 1024])]
fn validate_default(b: &mut Bencher, size: usize) {
    let queue = Arc::new(HostQueue::new(GpuTarget::G71));
    let ctx = GemmContext::new(queue);
    let a = TensorInfo::new([size, size], DType::F32);
    let bm = TensorInfo::new([size, size], DType::F32);
    let out = TensorInfo::new([size, size], DType::F32);
    let info = GemmInfo::default().with_reshape_rhs_once(true);
    b.iter(|| black_box(Gemm::validate(&ctx, &a, &bm, None, &out, 1.0, 0.0, &info).is_ok()));
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

#[flux::compare(
    id = "strategies_128",
    title = "GEMM 128×128 on G71 (native vs v1 vs reshaped vs rhs-only)",
    benchmarks = ["native_run@128", "reshaped_v1_run@128", "reshaped_run@128", "reshaped_only_rhs_run@128"],
    baseline = "native_run@128",
    metric = "mean"
)]
struct Strategies128;

#[flux::compare(
    id = "strategies_256",
    title = "GEMM 256×256 on G71 (native vs v1 vs reshaped vs rhs-only)",
    benchmarks = ["native_run@256", "reshaped_v1_run@256", "reshaped_run@256", "reshaped_only_rhs_run@256"],
    baseline = "native_run@256",
    metric = "mean"
)]
struct Strategies256;

#[flux::synthetic(
    id = "reshaped_speedup_256",
    formula = "native_run@256 / reshaped_run@256",
    unit = "x"
)]
struct ReshapedSpeedup256;

fn main() {
    fluxbench::run().unwrap();
}
