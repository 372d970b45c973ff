// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Progress callbacks for a forward pass.

use crate::Placement;
use std::time::Duration;

/// The orchestrator's phase within a forward pass.
///
/// With several offload points the offload phases repeat, and every host
/// layer after the first offload runs in [`Phase::LocalComputePost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Phase {
    LocalComputePre,
    OffloadSend,
    OffloadReceive,
    LocalComputePost,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalComputePre => "local-compute-pre",
            Self::OffloadSend => "offload-send",
            Self::OffloadReceive => "offload-receive",
            Self::LocalComputePost => "local-compute-post",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress events from the engine.
///
/// Both methods default to doing nothing.
pub trait PhaseObserver: Send {
    /// Called on entering `phase`. `layer` is the layer about to run.
    fn on_phase(&mut self, _phase: Phase, _layer: Option<usize>) {}

    /// Called after a layer has produced its output.
    fn on_layer(&mut self, _index: usize, _name: &str, _placement: Placement, _elapsed: Duration) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PhaseObserver for TracingObserver {
    fn on_phase(&mut self, phase: Phase, layer: Option<usize>) {
        match layer {
            Some(l) => tracing::debug!("phase {phase} (layer {l})"),
            None => tracing::debug!("phase {phase}"),
        }
    }

    fn on_layer(&mut self, index: usize, name: &str, placement: Placement, elapsed: Duration) {
        tracing::debug!("layer {index} '{name}' done on {placement} in {elapsed:?}");
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {}

/// A recorded observer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Phase(Phase, Option<usize>),
    Layer(usize, String, Placement),
}

/// Records events into a shared list, for tests and post-mortems.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: std::sync::Arc<std::sync::Mutex<Vec<ObservedEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events so far.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Just the phase sequence.
    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Phase(p, _) => Some(p),
                ObservedEvent::Layer(..) => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

impl PhaseObserver for RecordingObserver {
    fn on_phase(&mut self, phase: Phase, layer: Option<usize>) {
        self.push(ObservedEvent::Phase(phase, layer));
    }

    fn on_layer(&mut self, index: usize, name: &str, placement: Placement, _elapsed: Duration) {
        self.push(ObservedEvent::Layer(index, name.to_string(), placement));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_clones_share_events() {
        let recorder = RecordingObserver::new();
        let mut handle = recorder.clone();
        handle.on_phase(Phase::OffloadSend, Some(1));
        handle.on_layer(1, "dw_conv", Placement::Accelerator, Duration::ZERO);
        handle.on_phase(Phase::Done, None);

        assert_eq!(recorder.phases(), vec![Phase::OffloadSend, Phase::Done]);
        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::LocalComputePost.to_string(), "local-compute-post");
    }
}
