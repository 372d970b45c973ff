// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! The tensor type shared by host-side layers and the accelerator offload
//! codec.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, contiguous, row-major buffer paired with a
//!   [`Shape`] and a [`DType`].
//! - [`Shape`]: runtime shape descriptors.
//! - [`DType`]: supported element data types (f32, f16, bf16, i8).
//! - A handful of host kernels used by the network head: matrix
//!   multiplication, ReLU and global average pooling.
//!
//! # Invariant
//! For every tensor, `as_bytes().len() == shape.num_elements() * dtype.size_bytes()`.
//! Constructors that take external buffers enforce this and return
//! [`TensorError::BufferSizeMismatch`] otherwise.
//!
//! The in-memory byte order is always the host's native order. Anything that
//! crosses a process or device boundary goes through an explicit codec
//! (see the `offload-link` crate).

mod dtype;
mod error;
mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{global_avg_pool, matmul, relu};
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
