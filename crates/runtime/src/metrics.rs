// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Forward-pass profiling metrics.
//!
//! [`ForwardMetrics`] collects per-layer timings and per-offload transfer
//! statistics. The split between host time and link time is the number that
//! matters when deciding whether a layer is worth offloading at all.

use std::time::Duration;

/// Where a layer was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Host,
    Accelerator,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Accelerator => "accelerator",
        })
    }
}

/// Metrics for a single layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerMetrics {
    pub index: usize,
    pub name: String,
    pub placement: Placement,
    pub duration: Duration,
}

/// Transfer statistics for one offload round-trip.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OffloadMetrics {
    /// Offloaded layer index.
    pub layer: usize,
    /// Weight blob size in bytes.
    pub weight_bytes: u64,
    /// Everything written to the link: opcodes, weights and activation.
    pub bytes_sent: usize,
    /// Activation bytes read back, trailer included.
    pub bytes_received: usize,
    /// Time from the first opcode to the end of the activation write.
    pub send_duration: Duration,
    /// Time blocked waiting for the returned activation.
    pub receive_duration: Duration,
    /// Session open to session close.
    pub round_trip: Duration,
}

impl OffloadMetrics {
    /// Effective link throughput over the round-trip, in bytes per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.round_trip.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes_sent + self.bytes_received) as f64 / secs
    }
}

/// Aggregate metrics for one forward pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ForwardMetrics {
    /// Wall-clock time of the whole pass.
    pub total_duration: Duration,
    /// Time spent in host layers.
    pub host_duration: Duration,
    /// Time spent in offload round-trips.
    pub offload_duration: Duration,
    /// Per-layer records (only with profiling enabled).
    pub layers: Vec<LayerMetrics>,
    /// One record per offload point.
    pub offloads: Vec<OffloadMetrics>,
}

impl ForwardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a host layer.
    pub fn record_host(&mut self, index: usize, name: &str, duration: Duration, profile: bool) {
        self.host_duration += duration;
        if profile {
            self.layers.push(LayerMetrics {
                index,
                name: name.to_string(),
                placement: Placement::Host,
                duration,
            });
        }
    }

    /// Records an offloaded layer.
    pub fn record_offload(&mut self, name: &str, offload: OffloadMetrics, profile: bool) {
        self.offload_duration += offload.round_trip;
        if profile {
            self.layers.push(LayerMetrics {
                index: offload.layer,
                name: name.to_string(),
                placement: Placement::Accelerator,
                duration: offload.round_trip,
            });
        }
        self.offloads.push(offload);
    }

    pub fn finalise(&mut self, total: Duration) {
        self.total_duration = total;
    }

    /// Total bytes written to the link across all offloads.
    pub fn total_bytes_sent(&self) -> usize {
        self.offloads.iter().map(|o| o.bytes_sent).sum()
    }

    /// Total bytes read from the link across all offloads.
    pub fn total_bytes_received(&self) -> usize {
        self.offloads.iter().map(|o| o.bytes_received).sum()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let offload_pct = if self.total_duration.as_secs_f64() > 0.0 {
            self.offload_duration.as_secs_f64() / self.total_duration.as_secs_f64() * 100.0
        } else {
            0.0
        };

        format!(
            "Forward: {:.2}ms total, {:.2}ms host, {:.2}ms offload ({:.0}%), \
             {} offload(s), {} bytes sent, {} bytes received",
            self.total_duration.as_secs_f64() * 1000.0,
            self.host_duration.as_secs_f64() * 1000.0,
            self.offload_duration.as_secs_f64() * 1000.0,
            offload_pct,
            self.offloads.len(),
            self.total_bytes_sent(),
            self.total_bytes_received(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offload(layer: usize, ms: u64) -> OffloadMetrics {
        OffloadMetrics {
            layer,
            weight_bytes: 100,
            bytes_sent: 1_000,
            bytes_received: 500,
            send_duration: Duration::from_millis(ms / 2),
            receive_duration: Duration::from_millis(ms / 2),
            round_trip: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_empty_metrics() {
        let m = ForwardMetrics::new();
        assert_eq!(m.total_bytes_sent(), 0);
        assert!(m.summary().contains("0 offload(s)"));
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = ForwardMetrics::new();
        m.record_host(0, "stem", Duration::from_millis(2), true);
        m.record_offload("dw_conv", offload(1, 10), true);
        m.record_host(2, "relu", Duration::from_millis(3), true);
        m.finalise(Duration::from_millis(20));

        assert_eq!(m.layers.len(), 3);
        assert_eq!(m.layers[1].placement, Placement::Accelerator);
        assert_eq!(m.host_duration, Duration::from_millis(5));
        assert_eq!(m.offload_duration, Duration::from_millis(10));
        assert_eq!(m.total_bytes_sent(), 1_000);
        assert_eq!(m.total_bytes_received(), 500);
    }

    #[test]
    fn test_profiling_off_keeps_offloads() {
        let mut m = ForwardMetrics::new();
        m.record_host(0, "stem", Duration::from_millis(2), false);
        m.record_offload("dw_conv", offload(1, 10), false);
        assert!(m.layers.is_empty());
        assert_eq!(m.offloads.len(), 1);
    }

    #[test]
    fn test_summary_format() {
        let mut m = ForwardMetrics::new();
        m.record_offload("dw_conv", offload(1, 10), true);
        m.finalise(Duration::from_millis(10));
        let s = m.summary();
        assert!(s.contains("Forward:"));
        assert!(s.contains("1 offload(s)"));
        assert!(s.contains("1000 bytes sent"));
    }

    #[test]
    fn test_throughput() {
        assert!((offload(1, 1_000).throughput() - 1_500.0).abs() < 0.01);
    }
}
