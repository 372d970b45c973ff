// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-side tensor kernels.
//!
//! Each operation writes into a pre-allocated output tensor and validates
//! shapes and dtypes up front. Only `F32` is supported. Convolution and
//! batch normalisation live outside this crate.

mod avg_pool_op;
mod matmul_op;
mod relu_op;

pub use avg_pool_op::global_avg_pool;
pub use matmul_op::matmul;
pub use relu_op::relu;
