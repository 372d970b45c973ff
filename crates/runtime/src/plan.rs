// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Offload plan: which layers run on the accelerator.
//!
//! The plan is the contract between configuration and the engine. Each
//! [`OffloadPoint`] names a layer index, the weight blob the accelerator
//! needs for it, and the [`WireContract`] both sides agreed on.

use crate::RuntimeError;
use offload_link::{WireContract, MAX_FRAME_BYTES};
use std::path::PathBuf;

/// A single layer delegated to the accelerator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OffloadPoint {
    /// Index of the layer in the host network.
    pub layer: usize,
    /// Weight blob streamed before the layer executes.
    pub weights: PathBuf,
    /// Shapes, dtype and byte order of the activation exchange.
    pub contract: WireContract,
}

impl OffloadPoint {
    pub fn new(layer: usize, weights: impl Into<PathBuf>, contract: WireContract) -> Self {
        Self {
            layer,
            weights: weights.into(),
            contract,
        }
    }
}

/// The ordered set of offload points for one network.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OffloadPlan {
    points: Vec<OffloadPoint>,
}

impl OffloadPlan {
    /// Builds a plan, sorting points by layer index.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidPlan`] if two points share a layer or a
    /// contract has an empty or zero-sized shape, or a frame larger than
    /// [`MAX_FRAME_BYTES`].
    pub fn new(mut points: Vec<OffloadPoint>) -> Result<Self, RuntimeError> {
        points.sort_by_key(|p| p.layer);

        for pair in points.windows(2) {
            if pair[0].layer == pair[1].layer {
                return Err(RuntimeError::InvalidPlan(format!(
                    "layer {} is offloaded more than once",
                    pair[0].layer,
                )));
            }
        }

        for p in &points {
            for (what, shape) in [
                ("input", &p.contract.input_shape),
                ("output", &p.contract.output_shape),
            ] {
                if shape.rank() == 0 || shape.has_zero_dim() {
                    return Err(RuntimeError::InvalidPlan(format!(
                        "layer {}: {what} shape {shape} must have at least one dimension and no zero dimensions",
                        p.layer,
                    )));
                }
            }

            match p.contract.checked_frame_bytes() {
                Some((input, output)) if input.max(output) <= MAX_FRAME_BYTES => {}
                _ => {
                    return Err(RuntimeError::InvalidPlan(format!(
                        "layer {}: frame for {} -> {} exceeds {MAX_FRAME_BYTES} bytes",
                        p.layer, p.contract.input_shape, p.contract.output_shape,
                    )));
                }
            }
        }

        Ok(Self { points })
    }

    /// A plan that keeps every layer on the host.
    pub fn host_only() -> Self {
        Self::default()
    }

    /// Checks the plan against a network of `num_layers` layers.
    pub fn validate(&self, num_layers: usize) -> Result<(), RuntimeError> {
        if let Some(p) = self.points.iter().find(|p| p.layer >= num_layers) {
            return Err(RuntimeError::InvalidPlan(format!(
                "offload layer {} is out of range for a network of {num_layers} layers",
                p.layer,
            )));
        }
        Ok(())
    }

    /// Returns the offload point for `layer`, if it is delegated.
    pub fn point_for(&self, layer: usize) -> Option<&OffloadPoint> {
        self.points
            .binary_search_by_key(&layer, |p| p.layer)
            .ok()
            .map(|i| &self.points[i])
    }

    pub fn points(&self) -> &[OffloadPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bytes one forward pass puts on the wire, excluding weight blobs.
    pub fn activation_bytes_out(&self) -> usize {
        self.points
            .iter()
            .map(|p| 2 + p.contract.input_frame_bytes())
            .sum()
    }

    /// Bytes one forward pass reads back.
    pub fn activation_bytes_in(&self) -> usize {
        self.points
            .iter()
            .map(|p| p.contract.output_frame_bytes())
            .sum()
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        if self.points.is_empty() {
            return "Plan: host only (no offload points)".into();
        }
        let layers: Vec<String> = self.points.iter().map(|p| p.layer.to_string()).collect();
        format!(
            "Plan: {} offload point(s) at layer(s) [{}], {} activation bytes out, {} in per pass",
            self.points.len(),
            layers.join(", "),
            self.activation_bytes_out(),
            self.activation_bytes_in(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    fn point(layer: usize) -> OffloadPoint {
        OffloadPoint::new(
            layer,
            format!("w{layer}.bin"),
            WireContract::new(Shape::nchw(1, 32, 32, 32), Shape::nchw(1, 32, 32, 32), DType::F32),
        )
    }

    #[test]
    fn test_points_sorted() {
        let plan = OffloadPlan::new(vec![point(4), point(1)]).unwrap();
        let layers: Vec<usize> = plan.points().iter().map(|p| p.layer).collect();
        assert_eq!(layers, vec![1, 4]);
        assert!(plan.point_for(4).is_some());
        assert!(plan.point_for(2).is_none());
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        assert!(matches!(
            OffloadPlan::new(vec![point(1), point(1)]),
            Err(RuntimeError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_overflowing_frame_rejected() {
        let mut p = point(1);
        p.contract.input_shape = Shape::new(vec![1 << 32, 1 << 32]);
        assert!(matches!(
            OffloadPlan::new(vec![p]),
            Err(RuntimeError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut p = point(1);
        p.contract.output_shape = Shape::new(vec![MAX_FRAME_BYTES / 4 + 1]);
        assert!(OffloadPlan::new(vec![p]).is_err());

        let mut p = point(1);
        p.contract.output_shape = Shape::new(vec![MAX_FRAME_BYTES / 4]);
        assert!(OffloadPlan::new(vec![p]).is_ok());
    }

    #[test]
    fn test_zero_dim_rejected() {
        let mut p = point(1);
        p.contract.output_shape = Shape::new(vec![1, 0]);
        assert!(OffloadPlan::new(vec![p]).is_err());
    }

    #[test]
    fn test_empty_shape_rejected() {
        let mut p = point(1);
        p.contract.input_shape = Shape::scalar();
        assert!(OffloadPlan::new(vec![p]).is_err());
    }

    #[test]
    fn test_validate_range() {
        let plan = OffloadPlan::new(vec![point(5)]).unwrap();
        assert!(plan.validate(6).is_ok());
        assert!(plan.validate(5).is_err());
    }

    #[test]
    fn test_wire_budget() {
        let plan = OffloadPlan::new(vec![point(1)]).unwrap();
        assert_eq!(plan.activation_bytes_out(), 2 + 131_072);
        assert_eq!(plan.activation_bytes_in(), 131_072);
        assert!(plan.summary().contains("[1]"));
    }

    #[test]
    fn test_host_only() {
        let plan = OffloadPlan::host_only();
        assert!(plan.is_empty());
        assert!(plan.validate(0).is_ok());
        assert!(plan.summary().contains("host only"));
    }
}
