// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-side layers and the ordered network they form.
//!
//! Numeric kernels for convolution and batch normalisation live outside this
//! crate; callers plug them in through [`HostLayer`] (or [`FnLayer`] for a
//! closure). The layers here cover what a classifier head needs.

use tensor_core::{global_avg_pool, matmul, relu, DType, Shape, Tensor, TensorError};

/// One step of the host pipeline.
pub trait HostLayer: Send {
    /// Human-readable layer name, used in logs and metrics.
    fn name(&self) -> &str;

    /// Computes this layer's output from its input.
    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError>;
}

/// Passes its input through unchanged.
///
/// Also the natural placeholder for a layer that only ever runs on the
/// accelerator.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HostLayer for Identity {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        Ok(input)
    }
}

/// Element-wise `max(x, 0)`.
#[derive(Debug, Clone)]
pub struct Relu {
    name: String,
}

impl Relu {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HostLayer for Relu {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        let mut output = Tensor::zeros(input.shape().clone(), input.dtype());
        relu(&input.view(), &mut output)?;
        Ok(output)
    }
}

/// `[N, C, H, W]` → `[N, C, 1, 1]` spatial mean.
#[derive(Debug, Clone)]
pub struct GlobalAvgPool {
    name: String,
}

impl GlobalAvgPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HostLayer for GlobalAvgPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        let dims = input.shape().dims();
        let (n, c) = match dims {
            [n, c, _, _] => (*n, *c),
            _ => {
                return Err(TensorError::ShapeMismatch {
                    op: "global_avg_pool",
                    lhs: input.shape().clone(),
                    rhs: Shape::nchw(1, 1, 1, 1),
                })
            }
        };
        let mut output = Tensor::zeros(Shape::nchw(n, c, 1, 1), input.dtype());
        global_avg_pool(&input.view(), &mut output)?;
        Ok(output)
    }
}

/// Collapses every dimension after the first: `[N, ...]` → `[N, prod(...)]`.
#[derive(Debug, Clone)]
pub struct Flatten {
    name: String,
}

impl Flatten {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HostLayer for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        let dims = input.shape().dims();
        let Some((&batch, rest)) = dims.split_first() else {
            return Err(TensorError::InvalidShape {
                input: input.shape().to_string(),
                detail: "cannot flatten a scalar".into(),
            });
        };
        let features = rest.iter().product();
        input.reshape(Shape::matrix(batch, features))
    }
}

/// Fully-connected layer: `[N, in] @ [in, out] (+ bias)`.
#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    weight: Tensor,
    bias: Option<Vec<f32>>,
}

impl Linear {
    /// Creates a layer from an `[in, out]` `F32` weight matrix.
    pub fn new(name: impl Into<String>, weight: Tensor) -> Result<Self, TensorError> {
        if weight.shape().rank() != 2 || weight.dtype() != DType::F32 {
            return Err(TensorError::InvalidShape {
                input: weight.shape().to_string(),
                detail: format!("linear weight must be a rank-2 f32 matrix, got {}", weight.dtype()),
            });
        }
        Ok(Self {
            name: name.into(),
            weight,
            bias: None,
        })
    }

    /// Adds a bias of length `out`.
    pub fn with_bias(mut self, bias: Vec<f32>) -> Result<Self, TensorError> {
        let out = self.out_features();
        if bias.len() != out {
            return Err(TensorError::BufferSizeMismatch {
                expected: out,
                actual: bias.len(),
            });
        }
        self.bias = Some(bias);
        Ok(self)
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().dims()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().dims()[1]
    }
}

impl HostLayer for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        let batch = input.shape().dim(0).unwrap_or(0);
        let mut output = Tensor::zeros(Shape::matrix(batch, self.out_features()), DType::F32);
        matmul(&input.view(), &self.weight.view(), &mut output)?;

        if let Some(bias) = &self.bias {
            let mut values = output.to_f32_vec()?;
            for row in values.chunks_exact_mut(bias.len()) {
                for (v, b) in row.iter_mut().zip(bias) {
                    *v += b;
                }
            }
            output.write_f32(&values)?;
        }
        Ok(output)
    }
}

/// Adapts a closure into a [`HostLayer`].
pub struct FnLayer<F> {
    name: String,
    f: F,
}

impl<F> FnLayer<F>
where
    F: Fn(Tensor) -> Result<Tensor, TensorError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> HostLayer for FnLayer<F>
where
    F: Fn(Tensor) -> Result<Tensor, TensorError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, TensorError> {
        (self.f)(input)
    }
}

// ── Network ────────────────────────────────────────────────────

/// An ordered sequence of host layers.
///
/// Layer indices are positions in this sequence; an offload plan refers to
/// layers by the same index.
#[derive(Default)]
pub struct HostNetwork {
    layers: Vec<Box<dyn HostLayer>>,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer.
    pub fn push(mut self, layer: impl HostLayer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&dyn HostLayer> {
        self.layers.get(index).map(|l| l.as_ref())
    }

    pub fn layers(&self) -> impl Iterator<Item = &dyn HostLayer> {
        self.layers.iter().map(|l| l.as_ref())
    }

    /// Layer names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }
}

impl std::fmt::Debug for HostNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostNetwork")
            .field("layers", &self.names())
            .finish()
    }
}

/// Builds a small classifier around one accelerator slot:
///
/// ```text
/// 0 stem (relu) → 1 dw_conv (accelerator slot) → 2 relu → 3 avg_pool → 4 flatten → 5 fc
/// ```
///
/// The input is `[1, channels, H, W]`; the output is `[1, classes]`. The fully
/// connected head uses fixed, deterministic weights.
pub fn demo_network(channels: usize, classes: usize) -> Result<HostNetwork, TensorError> {
    let values: Vec<f32> = (0..channels * classes)
        .map(|i| ((i % 7) as f32 - 3.0) * 0.01)
        .collect();
    let weight = Tensor::from_f32(Shape::matrix(channels, classes), &values)?;

    Ok(HostNetwork::new()
        .push(Relu::new("stem"))
        .push(Identity::new("dw_conv"))
        .push(Relu::new("relu"))
        .push(GlobalAvgPool::new("avg_pool"))
        .push(Flatten::new("flatten"))
        .push(Linear::new("fc", weight)?))
}

/// Index of the accelerator slot in [`demo_network`].
pub const DEMO_OFFLOAD_LAYER: usize = 1;
