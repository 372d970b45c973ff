// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `hybrid-rt inspect` command: display the offload plan and its wire budget.
//!
//! For each offload point prints the exact number of bytes the host sends
//! and expects back, plus the time that takes at the configured line rate.

use offload_link::{DeviceConfig, Parity};
use std::path::PathBuf;

pub async fn execute(config_path: PathBuf) -> anyhow::Result<()> {
    let config = super::load_config(&config_path)?;
    let plan = config.offload_plan()?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             hybrid-rt · Offload Inspector           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Device ─────────────────────────────────────────────────
    let d = &config.device;
    println!("  Device:   {}", d.path);
    println!(
        "  Line:     {} baud, {} data bits, parity {:?}, {} stop bit(s)",
        d.baud_rate, d.data_bits, d.parity, d.stop_bits,
    );
    println!("  Timeout:  {:?} per read", d.read_timeout());
    println!("  Weights:  {:?} policy", config.weight_policy);
    println!();

    // ── Per-Offload Budget ─────────────────────────────────────
    println!("  {}", plan.summary());
    println!();
    println!(
        "  {:<5} {:<18} {:<18} {:>10} {:>10} {:>10}",
        "Layer", "Input", "Output", "Sent B", "Recv B", "Line time",
    );
    println!("  {}", "-".repeat(76));

    for point in plan.points() {
        let weight_bytes = match std::fs::metadata(&point.weights) {
            Ok(m) => m.len() as usize,
            Err(e) => {
                tracing::warn!("cannot stat {}: {e}", point.weights.display());
                0
            }
        };
        let c = &point.contract;
        let sent = 1 + weight_bytes + 1 + c.input_frame_bytes();
        let received = c.output_frame_bytes();
        println!(
            "  {:<5} {:<18} {:<18} {:>10} {:>10} {:>8.2}s",
            point.layer,
            c.input_shape.to_string(),
            c.output_shape.to_string(),
            sent,
            received,
            line_seconds(d, sent + received),
        );
        println!(
            "        weights {} ({weight_bytes} B), {} {:?}-endian, integrity {:?}",
            point.weights.display(),
            c.dtype,
            c.byte_order,
            c.integrity,
        );
    }
    println!();

    Ok(())
}

/// Seconds needed to move `bytes` at the configured framing.
fn line_seconds(device: &DeviceConfig, bytes: usize) -> f64 {
    let parity_bits = match device.parity {
        Parity::None => 0,
        Parity::Odd | Parity::Even => 1,
    };
    let bits_per_char = 1 + device.data_bits as u32 + parity_bits + device.stop_bits as u32;
    bytes as f64 * bits_per_char as f64 / device.baud_rate as f64
}
