// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Global average pooling over the spatial dimensions of an NCHW tensor.

use crate::{DType, Shape, Tensor, TensorError, TensorView};

/// Averages each `[H, W]` plane of an `[N, C, H, W]` input.
///
/// `output` must be `[N, C, 1, 1]`, the same geometry an adaptive average
/// pool with a 1×1 target produces.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the input is not rank 4 or the
/// output shape is wrong, and [`TensorError::UnsupportedDType`] for non-`F32`.
pub fn global_avg_pool(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    if input.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op: "global_avg_pool",
            dtype: input.dtype(),
        });
    }

    let dims = input.shape().dims();
    if dims.len() != 4 || input.shape().has_zero_dim() {
        return Err(TensorError::ShapeMismatch {
            op: "global_avg_pool",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }
    let (n, c, h, w) = (dims[0], dims[1], dims[2], dims[3]);

    let expected = Shape::nchw(n, c, 1, 1);
    if output.shape() != &expected {
        return Err(TensorError::ShapeMismatch {
            op: "global_avg_pool (output)",
            lhs: expected,
            rhs: output.shape().clone(),
        });
    }

    let plane = h * w;
    let src = input.to_f32_vec()?;
    let means: Vec<f32> = src
        .chunks_exact(plane)
        .map(|p| p.iter().sum::<f32>() / plane as f32)
        .collect();

    output.write_f32(&means)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_two_channels() {
        // Channel 0 = [1, 2, 3, 4], channel 1 = [10, 10, 10, 10].
        let input = Tensor::from_f32(
            Shape::nchw(1, 2, 2, 2),
            &[1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0],
        )
        .unwrap();
        let mut output = Tensor::zeros(Shape::nchw(1, 2, 1, 1), DType::F32);

        global_avg_pool(&input.view(), &mut output).unwrap();

        assert_eq!(output.to_f32_vec().unwrap(), vec![2.5, 10.0]);
    }

    #[test]
    fn test_pool_rejects_rank_2() {
        let input = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        let mut output = Tensor::zeros(Shape::nchw(1, 2, 1, 1), DType::F32);
        assert!(global_avg_pool(&input.view(), &mut output).is_err());
    }

    #[test]
    fn test_pool_wrong_output() {
        let input = Tensor::zeros(Shape::nchw(1, 2, 2, 2), DType::F32);
        let mut output = Tensor::zeros(Shape::matrix(1, 2), DType::F32);
        assert!(global_avg_pool(&input.view(), &mut output).is_err());
    }
}
