// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The hybrid execution engine that splits a convolutional forward pass
//! between the host and an FPGA accelerator on a serial link.
//!
//! The runtime takes:
//! - A [`HostNetwork`] of host layers.
//! - An [`OffloadPlan`] naming the layers the accelerator computes.
//! - A [`offload_link::Connector`] that opens one session per offload.
//!
//! And runs the network layer by layer, streaming weights and activations
//! to the accelerator at each offload point and splicing the returned
//! activation back into the host pipeline.
//!
//! # Type-State Pipeline
//! ```text
//! HybridEngine<Idle> → HybridEngine<Planned> → HybridEngine<Ready<C>>
//! ```
//! Transitions are compile-time checked.
//!
//! # Blocking Execution
//! A forward pass is synchronous and blocks on the serial link. Async
//! callers should run it on a blocking thread.

mod config;
mod engine;
mod error;
pub mod layer;
mod metrics;
pub mod observer;
mod plan;
mod weight_loader;

pub use config::{OffloadConfig, RuntimeConfig, WeightPolicy};
pub use engine::{EngineState, ForwardOutput, HybridEngine, Idle, Planned, Ready};
pub use error::RuntimeError;
pub use layer::{demo_network, HostLayer, HostNetwork, DEMO_OFFLOAD_LAYER};
pub use metrics::{ForwardMetrics, LayerMetrics, OffloadMetrics, Placement};
pub use observer::{NoopObserver, Phase, PhaseObserver, TracingObserver};
pub use plan::{OffloadPlan, OffloadPoint};
pub use weight_loader::WeightLoader;
