// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: one hybrid forward pass against the in-process accelerator.
//!
//! Layer 1 of a small classifier is offloaded. The loopback accelerator
//! applies a ReLU6 to the activation, standing in for a depthwise block.
//!
//! ```bash
//! cargo run -p runtime --example loopback_offload
//! ```

use offload_link::mock::{LoopbackConnector, LoopbackSpec};
use offload_link::WireContract;
use runtime::{
    demo_network, HybridEngine, OffloadPlan, OffloadPoint, DEMO_OFFLOAD_LAYER,
};
use std::io::Write;
use std::time::Duration;
use tensor_core::{DType, Shape, Tensor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing.
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let shape = Shape::nchw(1, 32, 32, 32);
    let contract = WireContract::new(shape.clone(), shape.clone(), DType::F32);

    // 32 depthwise 3×3 kernels, f32.
    let weight_bytes = 32 * 9 * 4;
    let mut weights = tempfile::NamedTempFile::new()?;
    weights.write_all(&vec![0u8; weight_bytes])?;
    weights.flush()?;

    let plan = OffloadPlan::new(vec![OffloadPoint::new(
        DEMO_OFFLOAD_LAYER,
        weights.path(),
        contract.clone(),
    )])?;
    println!("{}\n", plan.summary());

    let accelerator = LoopbackSpec::map_f32(weight_bytes, &contract, |x| x.clamp(0.0, 6.0));
    let mut engine = HybridEngine::new(plan)
        .plan(demo_network(32, 10)?)?
        .connect(LoopbackConnector::new(vec![accelerator], Duration::from_secs(2)));

    let values: Vec<f32> = (0..shape.num_elements()).map(|i| (i % 17) as f32 - 4.0).collect();
    let input = Tensor::from_f32(shape, &values)?;
    let out = engine.forward(input)?;

    println!("\nLogits: {:?}", out.output.to_f32_vec()?);
    println!("{}", out.metrics.summary());
    for o in &out.metrics.offloads {
        println!(
            "  layer {}: {} B out, {} B in, round-trip {:?}",
            o.layer, o.bytes_sent, o.bytes_received, o.round_trip,
        );
    }

    Ok(())
}
