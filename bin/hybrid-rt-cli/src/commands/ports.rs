// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `hybrid-rt ports` command: list serial ports visible to this host.

use anyhow::Context;
use serialport::SerialPortType;

pub async fn execute() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;

    if ports.is_empty() {
        println!("  No serial ports found.");
        return Ok(());
    }

    println!("  {:<24} {}", "Port", "Type");
    println!("  {}", "-".repeat(56));
    for port in ports {
        let kind = match port.port_type {
            SerialPortType::UsbPort(usb) => format!(
                "USB {:04x}:{:04x} {}",
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default(),
            ),
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::Unknown => "unknown".to_string(),
        };
        println!("  {:<24} {}", port.port_name, kind);
    }
    Ok(())
}
