// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `hybrid-rt run` command: one forward pass of the demo classifier.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! HybridEngine<Idle> → plan → <Planned> → connect → <Ready> → forward
//! ```
//!
//! The pass blocks on the serial link, so it runs on tokio's blocking pool.

use anyhow::Context;
use offload_link::mock::{LoopbackConnector, LoopbackSpec};
use offload_link::{Connector, SerialConnector};
use runtime::{demo_network, ForwardOutput, HybridEngine, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tensor_core::{DType, Shape, Tensor};

const DEMO_CLASSES: usize = 10;

pub async fn execute(config_path: PathBuf, loopback: bool, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(&config_path)?;

    let output = tokio::task::spawn_blocking(move || forward_once(&config, loopback))
        .await
        .context("forward pass task failed")??;

    if json {
        let report = serde_json::json!({
            "output_shape": output.output.shape(),
            "output": output.output.to_f32_vec()?,
            "metrics": output.metrics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           hybrid-rt · Forward Pass Runner           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Config:   {}", config_path.display());
    println!("  Target:   {}", if loopback { "loopback" } else { "serial device" });
    println!();
    print_results(&output)?;

    Ok(())
}

fn forward_once(config: &RuntimeConfig, loopback: bool) -> anyhow::Result<ForwardOutput> {
    let input_shape = config
        .offload
        .first()
        .map(|o| o.input_shape.clone())
        .unwrap_or_else(|| Shape::nchw(1, 32, 32, 32));
    let channels = config
        .offload
        .last()
        .and_then(|o| o.output_shape.dim(1))
        .unwrap_or(32);

    let input = ramp_input(input_shape)?;

    if loopback {
        forward_with(config, channels, input, loopback_connector(config))
    } else {
        forward_with(config, channels, input, SerialConnector::new(config.device.clone()))
    }
}

fn forward_with<C: Connector>(
    config: &RuntimeConfig,
    channels: usize,
    input: Tensor,
    connector: C,
) -> anyhow::Result<ForwardOutput> {
    let network = demo_network(channels, DEMO_CLASSES).context("failed to build demo network")?;
    let mut engine = HybridEngine::from_config(config)?
        .plan(network)?
        .connect(connector);
    Ok(engine.forward(input)?)
}

/// One loopback spec per offload point. Matching geometries get a ReLU6
/// kernel; anything else is answered with zeros of the output size.
fn loopback_connector(config: &RuntimeConfig) -> LoopbackConnector {
    let specs = config
        .offload
        .iter()
        .map(|o| {
            let weight_bytes = std::fs::metadata(&o.weights)
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            let contract = o.contract();
            if contract.input_shape == contract.output_shape && contract.dtype == DType::F32 {
                LoopbackSpec::map_f32(weight_bytes, &contract, |x| x.clamp(0.0, 6.0))
            } else {
                let out_bytes = contract.output_bytes();
                LoopbackSpec::new(
                    weight_bytes,
                    contract.input_bytes(),
                    Arc::new(move |_: &[u8], _: &[u8]| vec![0u8; out_bytes]),
                )
                .with_integrity(contract.integrity)
            }
        })
        .collect();
    LoopbackConnector::new(specs, config.device.read_timeout())
}

fn ramp_input(shape: Shape) -> anyhow::Result<Tensor> {
    let values: Vec<f32> = (0..shape.num_elements())
        .map(|i| ((i % 13) as f32 - 6.0) * 0.25)
        .collect();
    Ok(Tensor::from_f32(shape, &values)?)
}

fn print_results(output: &ForwardOutput) -> anyhow::Result<()> {
    let metrics = &output.metrics;

    println!("  Output {}:", output.output.shape());
    let values = output.output.to_f32_vec()?;
    let shown: Vec<String> = values.iter().take(10).map(|v| format!("{v:.4}")).collect();
    println!("   [{}{}]", shown.join(", "), if values.len() > 10 { ", …" } else { "" });
    println!();

    if !metrics.layers.is_empty() {
        println!("  {:<4} {:<16} {:<12} {:>10}", "Idx", "Layer", "Placement", "Time");
        println!("  {}", "-".repeat(46));
        for l in &metrics.layers {
            println!(
                "  {:<4} {:<16} {:<12} {:>8.3}ms",
                l.index,
                l.name,
                l.placement.to_string(),
                l.duration.as_secs_f64() * 1000.0,
            );
        }
        println!();
    }

    for o in &metrics.offloads {
        println!(
            "  Offload @ layer {}: {} weight B, {} B sent, {} B received, \
             send {:.2}ms, wait {:.2}ms, {:.1} KB/s",
            o.layer,
            o.weight_bytes,
            o.bytes_sent,
            o.bytes_received,
            o.send_duration.as_secs_f64() * 1000.0,
            o.receive_duration.as_secs_f64() * 1000.0,
            o.throughput() / 1024.0,
        );
    }
    println!();
    println!("  {}", metrics.summary());
    Ok(())
}
