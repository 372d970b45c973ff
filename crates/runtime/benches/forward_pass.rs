// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for a hybrid forward pass against the in-process loopback
//! accelerator. Measures host-side protocol overhead only; no real link.

use criterion::{criterion_group, criterion_main, Criterion};
use offload_link::mock::{LoopbackConnector, LoopbackSpec};
use offload_link::WireContract;
use runtime::{
    demo_network, HybridEngine, OffloadPlan, OffloadPoint, WeightPolicy, DEMO_OFFLOAD_LAYER,
};
use std::io::Write;
use std::time::Duration;
use tensor_core::{DType, Shape, Tensor};

const WEIGHT_BYTES: usize = 32 * 9 * 4;

fn bench_forward(c: &mut Criterion) {
    let mut weights = tempfile::NamedTempFile::new().unwrap();
    weights.write_all(&[0u8; WEIGHT_BYTES]).unwrap();
    weights.flush().unwrap();

    let shape = Shape::nchw(1, 32, 32, 32);
    let contract = WireContract::new(shape.clone(), shape.clone(), DType::F32);

    for policy in [WeightPolicy::Stream, WeightPolicy::Cache] {
        let plan = OffloadPlan::new(vec![OffloadPoint::new(
            DEMO_OFFLOAD_LAYER,
            weights.path(),
            contract.clone(),
        )])
        .unwrap();
        let connector = LoopbackConnector::new(
            vec![LoopbackSpec::echo(WEIGHT_BYTES, contract.input_bytes())],
            Duration::from_secs(1),
        );
        let mut engine = HybridEngine::new(plan)
            .with_weight_policy(policy)
            .with_profiling(false)
            .plan(demo_network(32, 10).unwrap())
            .unwrap()
            .connect(connector);
        let input = Tensor::zeros(shape.clone(), DType::F32);

        c.bench_function(&format!("forward demo 1x32x32x32 ({policy:?})"), |b| {
            b.iter(|| engine.forward(input.clone()).unwrap())
        });
    }
}

criterion_group!(benches, bench_forward);
criterion_main!(benches);
