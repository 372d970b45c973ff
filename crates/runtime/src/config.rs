// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! weight_policy = "stream"
//! enable_profiling = true
//!
//! [device]
//! path = "/dev/ttyUSB0"
//! baud_rate = 115200
//! read_timeout_ms = 10000
//!
//! [[offload]]
//! layer = 1
//! weights = "weights/dwcv2_weight_bin.bin"
//! input_shape = [1, 32, 32, 32]
//! output_shape = [1, 32, 32, 32]
//! dtype = "f32"
//! byte_order = "little"
//! ```

use crate::{OffloadPlan, OffloadPoint, RuntimeError};
use offload_link::{ByteOrder, DeviceConfig, Integrity, WireContract};
use std::path::{Path, PathBuf};
use tensor_core::{DType, Shape};

/// Whether weight blobs are re-read from disk on every offload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPolicy {
    /// Open and stream the file on every offload.
    #[default]
    Stream,
    /// Keep the blob in memory until the file changes on disk.
    Cache,
}

/// One `[[offload]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OffloadConfig {
    /// Index of the delegated layer.
    pub layer: usize,
    /// Weight blob for the layer.
    pub weights: PathBuf,
    pub input_shape: Shape,
    pub output_shape: Shape,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub integrity: Integrity,
}

fn default_dtype() -> DType {
    DType::F32
}

impl OffloadConfig {
    /// Returns the wire contract this entry describes.
    pub fn contract(&self) -> WireContract {
        WireContract::new(self.input_shape.clone(), self.output_shape.clone(), self.dtype)
            .with_byte_order(self.byte_order)
            .with_integrity(self.integrity)
    }
}

/// Configuration for the hybrid runtime.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Weight blob handling between forward passes.
    #[serde(default)]
    pub weight_policy: WeightPolicy,
    /// Whether to record per-layer timings.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
    /// Serial device of the accelerator.
    pub device: DeviceConfig,
    /// Layers delegated to the accelerator.
    #[serde(default)]
    pub offload: Vec<OffloadConfig>,
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Relative weight paths are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            for entry in &mut config.offload {
                if entry.weights.is_relative() {
                    entry.weights = base.join(&entry.weights);
                }
            }
        }
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Checks the device settings and every offload entry.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.device
            .validate()
            .map_err(|e| RuntimeError::ConfigError(e.to_string()))?;
        self.offload_plan().map(|_| ())
    }

    /// Builds the offload plan described by the `[[offload]]` entries.
    pub fn offload_plan(&self) -> Result<OffloadPlan, RuntimeError> {
        let points = self
            .offload
            .iter()
            .map(|o| OffloadPoint::new(o.layer, o.weights.clone(), o.contract()))
            .collect();
        OffloadPlan::new(points).map_err(|e| match e {
            RuntimeError::InvalidPlan(detail) => RuntimeError::ConfigError(detail),
            other => other,
        })
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let activation = Shape::nchw(1, 32, 32, 32);
        Self {
            weight_policy: WeightPolicy::Stream,
            enable_profiling: true,
            device: DeviceConfig::new("/dev/ttyUSB0"),
            offload: vec![OffloadConfig {
                layer: 1,
                weights: PathBuf::from("weights/dwcv2_weight_bin.bin"),
                input_shape: activation.clone(),
                output_shape: activation,
                dtype: DType::F32,
                byte_order: ByteOrder::Little,
                integrity: Integrity::None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.weight_policy, WeightPolicy::Stream);
        assert!(c.enable_profiling);
        assert_eq!(c.device.baud_rate, 115_200);
        assert_eq!(c.offload.len(), 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
weight_policy = "cache"
enable_profiling = false

[device]
path = "/dev/ttyACM0"
baud_rate = 921600
parity = "even"
read_timeout_ms = 2500

[[offload]]
layer = 1
weights = "/opt/weights/dw2.bin"
input_shape = [1, 32, 32, 32]
output_shape = [1, 32, 32, 32]

[[offload]]
layer = 3
weights = "/opt/weights/dw3.bin"
input_shape = [1, 64, 16, 16]
output_shape = [1, 64, 16, 16]
byte_order = "big"
integrity = "crc32"
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.weight_policy, WeightPolicy::Cache);
        assert!(!c.enable_profiling);
        assert_eq!(c.device.baud_rate, 921_600);
        assert_eq!(c.device.parity, offload_link::Parity::Even);
        assert_eq!(c.offload[0].dtype, DType::F32);
        assert_eq!(c.offload[0].byte_order, ByteOrder::Little);
        assert_eq!(c.offload[1].contract().integrity, Integrity::Crc32);
        assert_eq!(c.offload_plan().unwrap().len(), 2);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = r#"
[device]
path = "/dev/ttyUSB0"
read_timeout_ms = 0
"#;
        assert!(matches!(
            RuntimeConfig::from_toml(toml),
            Err(RuntimeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_data_bits_rejected() {
        let toml = r#"
[device]
path = "/dev/ttyUSB0"
data_bits = 9
"#;
        assert!(RuntimeConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let toml = r#"
[device]
path = "/dev/ttyUSB0"

[[offload]]
layer = 1
weights = "w.bin"
input_shape = [4294967296, 4294967296]
output_shape = [1, 32, 32, 32]
"#;
        assert!(matches!(
            RuntimeConfig::from_toml(toml),
            Err(RuntimeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_dim_rejected() {
        let toml = r#"
[device]
path = "/dev/ttyUSB0"

[[offload]]
layer = 1
weights = "w.bin"
input_shape = [1, 0, 32, 32]
output_shape = [1, 32, 32, 32]
"#;
        assert!(matches!(
            RuntimeConfig::from_toml(toml),
            Err(RuntimeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_shape_rejected() {
        let toml = r#"
[device]
path = "/dev/ttyUSB0"

[[offload]]
layer = 1
weights = "w.bin"
input_shape = []
output_shape = [1]
"#;
        assert!(RuntimeConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig::default();
        let toml = c.to_toml().unwrap();
        let back = RuntimeConfig::from_toml(&toml).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_from_file_resolves_relative_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hybrid.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(RuntimeConfig::default().to_toml().unwrap().as_bytes())
            .unwrap();

        let c = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(
            c.offload[0].weights,
            dir.path().join("weights/dwcv2_weight_bin.bin")
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RuntimeConfig::from_file(Path::new("/nonexistent/hybrid.toml")),
            Err(RuntimeError::ConfigError(_))
        ));
    }
}
