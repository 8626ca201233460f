//! Tests for sharing reshaped weights across planners.

mod common;

use common::{create_queue, force_strategy, test_tensor};
use gemmkit::kernels::ReshapeRhsKernel;
use gemmkit::prelude::*;

fn configure(
    ctx: &GemmContext,
    a: &Tensor,
    b: &Tensor,
    out: &Tensor,
    info: &GemmInfo,
) -> Gemm {
    let mut gemm = Gemm::new(ctx.clone());
    gemm.configure(a, b, None, out, 1.0, 0.0, info).unwrap();
    gemm
}

#[test]
fn test_two_consumers_share_one_reshape() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let shared_ctx = ctx.clone().with_weights_manager(manager.clone());

    let b = test_tensor(&[64, 64], 2);
    manager.manage(&b);
    let info = GemmInfo::default().with_reshape_rhs_once(true);

    let a1 = test_tensor(&[64, 64], 1);
    let a2 = test_tensor(&[64, 64], 5);
    let out1 = Tensor::zeros(&[64, 64], DType::F32);
    let out2 = Tensor::zeros(&[64, 64], DType::F32);
    let mut g1 = configure(&shared_ctx, &a1, &b, &out1, &info);
    let mut g2 = configure(&shared_ctx, &a2, &b, &out2, &info);
    assert_eq!(manager.len(), 1);
    assert!(g1.stages()[1].shared);

    g1.run().unwrap();
    g2.run().unwrap();
    g1.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 1);

    // Same computation without the cache, on its own queue
    let (plain_queue, plain_ctx) = create_queue(GpuTarget::G71);
    let plain_b = Tensor::from_slice(&b.to_vec::<f32>().unwrap(), &[64, 64]).unwrap();
    for (a, out) in [(&a1, &out1), (&a2, &out2)] {
        let reference = Tensor::zeros(&[64, 64], DType::F32);
        let mut g = configure(&plain_ctx, a, &plain_b, &reference, &info);
        g.run().unwrap();
        plain_queue.finish().unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), reference.to_vec::<f32>().unwrap());
    }
}

#[test]
fn test_unmanaged_weights_are_private() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx.with_weights_manager(manager.clone());

    let b = test_tensor(&[64, 64], 2);
    let a = test_tensor(&[64, 64], 1);
    let info = GemmInfo::default().with_reshape_rhs_once(true);
    let (o1, o2) = (
        Tensor::zeros(&[64, 64], DType::F32),
        Tensor::zeros(&[64, 64], DType::F32),
    );
    let mut g1 = configure(&ctx, &a, &b, &o1, &info);
    let mut g2 = configure(&ctx, &a, &b, &o2, &info);
    g1.run().unwrap();
    g2.run().unwrap();
    queue.finish().unwrap();

    assert!(manager.is_empty());
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 2);
    assert!(!g1.stages()[1].shared);
}

#[test]
fn test_different_layouts_do_not_share() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx.with_weights_manager(manager.clone());

    let b = test_tensor(&[32, 32], 2);
    manager.manage(&b);
    let a = test_tensor(&[32, 32], 1);
    let info = GemmInfo::default().with_reshape_rhs_once(true);
    let (o1, o2) = (
        Tensor::zeros(&[32, 32], DType::F32),
        Tensor::zeros(&[32, 32], DType::F32),
    );

    let mut g1 = configure(
        &ctx.clone().with_heuristics(force_strategy(GemmStrategy::Reshaped)),
        &a,
        &b,
        &o1,
        &info,
    );
    let mut g2 = configure(
        &ctx.clone().with_heuristics(force_strategy(GemmStrategy::ReshapedOnlyRhs)),
        &a,
        &b,
        &o2,
        &info,
    );
    assert_ne!(g1.rhs_tile_config(), g2.rhs_tile_config());
    assert_eq!(manager.len(), 2);

    g1.run().unwrap();
    g2.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 2);
    common::assert_allclose_f32(
        &o1.to_vec::<f32>().unwrap(),
        &o2.to_vec::<f32>().unwrap(),
        1e-5,
        1e-5,
        "layouts",
    );
}

#[test]
fn test_dropping_consumers_releases_entry() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx.with_weights_manager(manager.clone());

    let b = test_tensor(&[64, 64], 2);
    manager.manage(&b);
    let a = test_tensor(&[64, 64], 1);
    let out = Tensor::zeros(&[64, 64], DType::F32);
    let info = GemmInfo::default().with_reshape_rhs_once(true);

    let mut g1 = configure(&ctx, &a, &b, &out, &info);
    let g2 = configure(&ctx, &a, &b, &out, &info);
    g1.run().unwrap();
    queue.finish().unwrap();

    drop(g1);
    assert_eq!(manager.len(), 1);
    drop(g2);
    assert!(manager.is_empty());
}

#[test]
fn test_invalidate_forces_reshape() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx
        .with_weights_manager(manager.clone())
        .with_heuristics(force_strategy(GemmStrategy::Reshaped));

    let b = test_tensor(&[16, 16], 2);
    manager.manage(&b);
    let a = test_tensor(&[16, 16], 1);
    let out = Tensor::zeros(&[16, 16], DType::F32);

    // Without reshape-once the managed copy is still produced only once
    let mut gemm = configure(&ctx, &a, &b, &out, &GemmInfo::default());
    for _ in 0..3 {
        gemm.run().unwrap();
    }
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 1);
    let before = out.to_vec::<f32>().unwrap();

    let doubled: Vec<f32> = b.to_vec::<f32>().unwrap().iter().map(|v| v * 2.0).collect();
    b.write_slice(&doubled).unwrap();
    manager.invalidate(&b);
    gemm.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 2);

    let after = out.to_vec::<f32>().unwrap();
    for (x, y) in after.iter().zip(&before) {
        assert!((x - 2.0 * y).abs() <= 1e-5 + 1e-5 * y.abs());
    }
}

#[test]
fn test_invalidate_reaches_reshape_once_consumers() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx
        .with_weights_manager(manager.clone())
        .with_heuristics(force_strategy(GemmStrategy::Reshaped));

    let b = test_tensor(&[16, 16], 2);
    manager.manage(&b);
    let a = test_tensor(&[16, 16], 1);
    let out = Tensor::zeros(&[16, 16], DType::F32);
    let reuse = GemmInfo::default().with_reshape_rhs_once(true);

    let mut gemm = configure(&ctx, &a, &b, &out, &reuse);
    gemm.run().unwrap();
    gemm.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 1);
    let before = out.to_vec::<f32>().unwrap();

    let doubled: Vec<f32> = b.to_vec::<f32>().unwrap().iter().map(|v| v * 2.0).collect();
    b.write_slice(&doubled).unwrap();
    manager.invalidate(&b);
    gemm.run().unwrap();
    gemm.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 2);

    let after = out.to_vec::<f32>().unwrap();
    for (x, y) in after.iter().zip(&before) {
        assert!((x - 2.0 * y).abs() <= 1e-5 + 1e-5 * y.abs());
    }
}

#[test]
fn test_prepare_keeps_managed_rhs_in_use() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx.with_weights_manager(manager.clone());

    let b = test_tensor(&[64, 64], 2);
    manager.manage(&b);
    let a = test_tensor(&[64, 64], 1);
    let out = Tensor::zeros(&[64, 64], DType::F32);

    let mut gemm = configure(&ctx, &a, &b, &out, &GemmInfo::default().with_reshape_rhs_once(true));
    gemm.prepare().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 1);
    assert!(b.is_used());
}

#[test]
fn test_retained_weights_consume_shared_copy() {
    let (queue, ctx) = create_queue(GpuTarget::G71);
    let manager = Arc::new(WeightsManager::new());
    let ctx = ctx.with_weights_manager(manager.clone());

    let b = test_tensor(&[64, 64], 2);
    manager.manage(&b);
    let a = test_tensor(&[64, 64], 1);
    let (o1, o2) = (
        Tensor::zeros(&[64, 64], DType::F32),
        Tensor::zeros(&[64, 64], DType::F32),
    );
    let reuse = GemmInfo::default().with_reshape_rhs_once(true);

    let mut producer = configure(&ctx, &a, &b, &o1, &reuse);
    producer.prepare().unwrap();
    let mut consumer = configure(
        &ctx,
        &a,
        &b,
        &o2,
        &reuse.clone().with_retain_internal_weights(true),
    );
    assert_eq!(consumer.state(), LifecycleState::Prepared);

    producer.run().unwrap();
    consumer.run().unwrap();
    queue.finish().unwrap();
    assert_eq!(queue.launch_count(ReshapeRhsKernel::NAME), 1);
    assert_eq!(o1.to_vec::<f32>().unwrap(), o2.to_vec::<f32>().unwrap());
}
