// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The hybrid engine with type-state–enforced pipeline.
//!
//! ```text
//! HybridEngine<Idle>
//!     │  .plan(network)
//!     ▼
//! HybridEngine<Planned>
//!     │  .connect(connector)
//!     ▼
//! HybridEngine<Ready<C>>
//!     │  .forward(input)
//!     ▼
//!   ForwardOutput
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error. The states carry the
//! data that becomes available at that point, so a `Ready` engine always
//! has a network and a connector.

use crate::observer::{Phase, PhaseObserver, TracingObserver};
use crate::{
    ForwardMetrics, HostNetwork, OffloadMetrics, OffloadPlan, OffloadPoint, Placement,
    RuntimeConfig, RuntimeError, WeightLoader, WeightPolicy,
};
use offload_link::{codec, write_opcode, Connector, LinkError, Opcode};
use std::time::Instant;
use tensor_core::Tensor;

// ── Type-state markers ─────────────────────────────────────────

/// Engine is created with an offload plan but no network.
#[derive(Debug)]
pub struct Idle;

/// The network is attached and the plan has been checked against it.
#[derive(Debug)]
pub struct Planned {
    network: HostNetwork,
}

/// A connector is attached; the engine can run forward passes.
pub struct Ready<C: Connector> {
    network: HostNetwork,
    connector: C,
}

mod sealed {
    pub trait Sealed {}
}

/// Sealed trait for engine states.
pub trait EngineState: sealed::Sealed {}
impl sealed::Sealed for Idle {}
impl sealed::Sealed for Planned {}
impl<C: Connector> sealed::Sealed for Ready<C> {}
impl EngineState for Idle {}
impl EngineState for Planned {}
impl<C: Connector> EngineState for Ready<C> {}

// ── Forward output ─────────────────────────────────────────────

/// The result of a single forward pass.
#[derive(Debug)]
pub struct ForwardOutput {
    /// The final activation.
    pub output: Tensor,
    /// Per-layer timings and per-offload transfer statistics.
    pub metrics: ForwardMetrics,
}

// ── Engine ─────────────────────────────────────────────────────

/// The hybrid host/accelerator engine.
///
/// `S` is a type-state marker that enforces the pipeline ordering at
/// compile time. You cannot call `.forward()` on an `Idle` engine.
///
/// # Example
/// ```no_run
/// use offload_link::SerialConnector;
/// use runtime::{demo_network, HybridEngine, RuntimeConfig};
/// use tensor_core::{DType, Shape, Tensor};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RuntimeConfig::default();
/// let mut engine = HybridEngine::from_config(&config)?
///     .plan(demo_network(32, 10)?)?
///     .connect(SerialConnector::new(config.device.clone()));
/// let input = Tensor::zeros(Shape::nchw(1, 32, 32, 32), DType::F32);
/// let out = engine.forward(input)?;
/// println!("{}", out.metrics.summary());
/// # Ok(())
/// # }
/// ```
pub struct HybridEngine<S: EngineState = Idle> {
    offload_plan: OffloadPlan,
    loader: WeightLoader,
    profiling: bool,
    observer: Box<dyn PhaseObserver>,
    state: S,
}

// ── Idle → Planned ─────────────────────────────────────────────

impl HybridEngine<Idle> {
    /// Creates an engine for the given offload plan.
    ///
    /// Defaults: stream weight policy, profiling on, tracing observer.
    pub fn new(offload_plan: OffloadPlan) -> Self {
        tracing::info!("engine created: {}", offload_plan.summary());
        Self {
            offload_plan,
            loader: WeightLoader::new(WeightPolicy::Stream),
            profiling: true,
            observer: Box::new(TracingObserver),
            state: Idle,
        }
    }

    /// Creates an engine from a validated configuration.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self::new(config.offload_plan()?)
            .with_weight_policy(config.weight_policy)
            .with_profiling(config.enable_profiling))
    }

    pub fn with_weight_policy(mut self, policy: WeightPolicy) -> Self {
        self.loader = WeightLoader::new(policy);
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Replaces the default tracing observer.
    pub fn with_observer(mut self, observer: impl PhaseObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Attaches the host network and checks the plan against it.
    /// Transitions to the `Planned` state.
    pub fn plan(self, network: HostNetwork) -> Result<HybridEngine<Planned>, RuntimeError> {
        self.offload_plan.validate(network.len())?;
        tracing::info!(
            "network planned: {} layers, {} offloaded",
            network.len(),
            self.offload_plan.len(),
        );
        Ok(HybridEngine {
            offload_plan: self.offload_plan,
            loader: self.loader,
            profiling: self.profiling,
            observer: self.observer,
            state: Planned { network },
        })
    }
}

// ── Planned → Ready ────────────────────────────────────────────

impl HybridEngine<Planned> {
    pub fn offload_plan(&self) -> &OffloadPlan {
        &self.offload_plan
    }

    pub fn network(&self) -> &HostNetwork {
        &self.state.network
    }

    /// Attaches the connector used to open one session per offload.
    /// Transitions to the `Ready` state. No device is opened here.
    pub fn connect<C: Connector>(self, connector: C) -> HybridEngine<Ready<C>> {
        tracing::info!("engine ready: accelerator at {}", connector.describe());
        HybridEngine {
            offload_plan: self.offload_plan,
            loader: self.loader,
            profiling: self.profiling,
            observer: self.observer,
            state: Ready {
                network: self.state.network,
                connector,
            },
        }
    }
}

// ── Ready: forward passes ──────────────────────────────────────

impl<C: Connector> HybridEngine<Ready<C>> {
    pub fn offload_plan(&self) -> &OffloadPlan {
        &self.offload_plan
    }

    pub fn network(&self) -> &HostNetwork {
        &self.state.network
    }

    pub fn connector(&self) -> &C {
        &self.state.connector
    }

    pub fn weight_loader(&self) -> &WeightLoader {
        &self.loader
    }

    /// Runs one forward pass.
    ///
    /// Host layers run in order; at each offload point the activation is
    /// sent to the accelerator over a fresh session and the returned tensor
    /// replaces the layer's host computation. Any failure aborts the pass
    /// with no partial output. `&mut self` guarantees one offload at a time.
    pub fn forward(&mut self, input: Tensor) -> Result<ForwardOutput, RuntimeError> {
        let HybridEngine {
            offload_plan,
            loader,
            profiling,
            observer,
            state,
        } = self;
        let profiling = *profiling;
        let run_start = Instant::now();
        let mut metrics = ForwardMetrics::new();
        let mut phase: Option<Phase> = None;
        let mut x = input;

        tracing::debug!(
            "starting forward pass: input {} {}, {} layers",
            x.dtype(),
            x.shape(),
            state.network.len(),
        );

        for (index, layer) in state.network.layers().enumerate() {
            let layer_start = Instant::now();

            if let Some(point) = offload_plan.point_for(index) {
                let (output, stats) =
                    offload(&state.connector, loader, point, x, &mut **observer)?;
                x = output;
                phase = Some(Phase::OffloadReceive);
                let elapsed = layer_start.elapsed();
                metrics.record_offload(layer.name(), stats, profiling);
                observer.on_layer(index, layer.name(), Placement::Accelerator, elapsed);
                continue;
            }

            let local = match phase {
                None | Some(Phase::LocalComputePre) => Phase::LocalComputePre,
                _ => Phase::LocalComputePost,
            };
            if phase != Some(local) {
                observer.on_phase(local, Some(index));
                phase = Some(local);
            }

            x = layer
                .forward(x)
                .map_err(|source| RuntimeError::LayerError {
                    layer: index,
                    name: layer.name().to_string(),
                    source,
                })?;
            let elapsed = layer_start.elapsed();
            metrics.record_host(index, layer.name(), elapsed, profiling);
            observer.on_layer(index, layer.name(), Placement::Host, elapsed);
        }

        observer.on_phase(Phase::Done, None);
        metrics.finalise(run_start.elapsed());
        tracing::info!("{}", metrics.summary());

        Ok(ForwardOutput { output: x, metrics })
    }
}

/// One offload round-trip over a fresh session.
///
/// The weight blob is resolved and the activation checked before the session
/// opens, so neither failure puts a byte on the wire. The session is closed
/// on every path: explicitly on success, by `Drop` on error.
fn offload<C: Connector>(
    connector: &C,
    loader: &mut WeightLoader,
    point: &OffloadPoint,
    input: Tensor,
    observer: &mut dyn PhaseObserver,
) -> Result<(Tensor, OffloadMetrics), RuntimeError> {
    let layer = point.layer;
    let contract = &point.contract;
    let link = move |source: LinkError| RuntimeError::Link { layer, source };

    observer.on_phase(Phase::OffloadSend, Some(layer));

    if input.shape() != &contract.input_shape || input.dtype() != contract.dtype {
        return Err(RuntimeError::ContractViolation {
            layer,
            expected: format!("{} {}", contract.dtype, contract.input_shape),
            actual: format!("{} {}", input.dtype(), input.shape()),
        });
    }

    let blob = loader.load(&point.weights).map_err(link)?;
    let weight_bytes = blob.len();

    let round_trip_start = Instant::now();
    let mut session = connector.connect().map_err(link)?;
    tracing::debug!(
        "offload layer {layer}: {} weight bytes, {} activation bytes out, {} back via {}",
        weight_bytes,
        contract.input_frame_bytes(),
        contract.output_frame_bytes(),
        session.device(),
    );

    write_opcode(&mut session, Opcode::LoadWeights).map_err(link)?;
    blob.stream_to(&mut session).map_err(link)?;
    write_opcode(&mut session, Opcode::ExecuteLayer).map_err(link)?;
    codec::write_tensor(&mut session, &input.view(), contract).map_err(link)?;
    let send_duration = round_trip_start.elapsed();

    observer.on_phase(Phase::OffloadReceive, Some(layer));
    let receive_start = Instant::now();
    let received = codec::read_tensor(&mut session, contract);
    let receive_duration = receive_start.elapsed();

    let bytes_sent = session.bytes_written();
    let bytes_received = session.bytes_read();
    session.close();
    let output = received.map_err(link)?;

    Ok((
        output,
        OffloadMetrics {
            layer,
            weight_bytes,
            bytes_sent,
            bytes_received,
            send_duration,
            receive_duration,
            round_trip: round_trip_start.elapsed(),
        },
    ))
}

impl<S: EngineState> std::fmt::Debug for HybridEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridEngine")
            .field("state", &std::any::type_name::<S>())
            .field("offload_points", &self.offload_plan.len())
            .field("weight_policy", &self.loader.policy())
            .field("profiling", &self.profiling)
            .finish()
    }
}
