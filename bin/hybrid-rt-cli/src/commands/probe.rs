// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `hybrid-rt probe` command: open and close the configured serial device.

use anyhow::Context;
use offload_link::SerialSession;
use std::path::PathBuf;
use std::time::Instant;

pub async fn execute(config_path: PathBuf) -> anyhow::Result<()> {
    let config = super::load_config(&config_path)?;
    let device = config.device.clone();

    let started = Instant::now();
    tokio::task::spawn_blocking(move || {
        let mut session = SerialSession::open(&device)?;
        session.close();
        Ok::<_, offload_link::LinkError>(())
    })
    .await
    .context("probe task failed")?
    .with_context(|| format!("cannot open '{}'", config.device.path))?;

    println!(
        "  {} opened and closed in {:?} ({} baud)",
        config.device.path,
        started.elapsed(),
        config.device.baud_rate,
    );
    Ok(())
}
