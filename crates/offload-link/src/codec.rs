// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor wire codec.
//!
//! A tensor goes on the wire as its elements in row-major order, each
//! element in the contract's [`ByteOrder`], with no header. The receiver
//! needs the shape and dtype out of band; [`WireContract`] carries them.
//!
//! ```text
//! payload = elem[0] ‖ elem[1] ‖ … ‖ elem[prod(shape) - 1]
//! frame   = payload [‖ crc32_be(payload)]    (trailer only with Integrity::Crc32)
//! ```

use crate::{LinkError, SerialSession, Transport};
use tensor_core::{DType, Shape, Tensor, TensorView};

/// Byte order of multi-byte elements on the wire.
///
/// Fixed per contract, independent of the host's native order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Returns `true` if this is the host's native order.
    pub fn matches_host(self) -> bool {
        match self {
            Self::Little => cfg!(target_endian = "little"),
            Self::Big => cfg!(target_endian = "big"),
        }
    }
}

/// Optional integrity trailer appended to each tensor frame.
///
/// Production firmware speaks [`Integrity::None`]; the CRC-32 trailer is for
/// bring-up against firmware built with the matching debug option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrity {
    #[default]
    None,
    Crc32,
}

impl Integrity {
    /// Bytes added after each payload.
    pub fn trailer_bytes(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc32 => 4,
        }
    }
}

/// Largest activation frame, in either direction, a contract may describe.
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// The byte-level agreement for one offloaded layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireContract {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub dtype: DType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub integrity: Integrity,
}

impl WireContract {
    /// Creates a little-endian contract with no integrity trailer.
    pub fn new(input_shape: Shape, output_shape: Shape, dtype: DType) -> Self {
        Self {
            input_shape,
            output_shape,
            dtype,
            byte_order: ByteOrder::Little,
            integrity: Integrity::None,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_integrity(mut self, integrity: Integrity) -> Self {
        self.integrity = integrity;
        self
    }

    /// Payload bytes the host sends.
    pub fn input_bytes(&self) -> usize {
        self.input_shape.size_bytes(self.dtype)
    }

    /// Payload bytes the host expects back.
    pub fn output_bytes(&self) -> usize {
        self.output_shape.size_bytes(self.dtype)
    }

    /// Bytes the host sends for the activation, trailer included.
    pub fn input_frame_bytes(&self) -> usize {
        self.input_bytes() + self.integrity.trailer_bytes()
    }

    /// Bytes the host reads back, trailer included.
    pub fn output_frame_bytes(&self) -> usize {
        self.output_bytes() + self.integrity.trailer_bytes()
    }

    /// `(input, output)` frame sizes, trailer included, or `None` if either
    /// overflows `usize`.
    pub fn checked_frame_bytes(&self) -> Option<(usize, usize)> {
        let trailer = self.integrity.trailer_bytes();
        let input = self
            .input_shape
            .checked_size_bytes(self.dtype)?
            .checked_add(trailer)?;
        let output = self
            .output_shape
            .checked_size_bytes(self.dtype)?
            .checked_add(trailer)?;
        Some((input, output))
    }

    /// Checks that `tensor` has this contract's input geometry.
    pub fn check_input(&self, tensor: &TensorView<'_>) -> Result<(), LinkError> {
        if tensor.shape() != &self.input_shape || tensor.dtype() != self.dtype {
            return Err(LinkError::ShapeMismatch {
                expected: format!("{} {}", self.dtype, self.input_shape),
                actual: format!("{} {}", tensor.dtype(), tensor.shape()),
            });
        }
        Ok(())
    }
}

/// Serialises `tensor` to wire bytes in `order`.
///
/// The output is exactly `tensor.size_bytes()` long. Element values are
/// preserved bit for bit, NaN payloads and signed zeros included.
pub fn encode(tensor: &TensorView<'_>, order: ByteOrder) -> Vec<u8> {
    let mut bytes = tensor.as_bytes().to_vec();
    swap_if_needed(&mut bytes, tensor.dtype(), order);
    bytes
}

/// Builds a tensor from wire bytes in `order`.
///
/// # Errors
/// [`LinkError::ShapeMismatch`] if `bytes.len()` is not
/// `prod(shape) × dtype.size_bytes()`.
pub fn decode_bytes(
    mut bytes: Vec<u8>,
    shape: &Shape,
    dtype: DType,
    order: ByteOrder,
) -> Result<Tensor, LinkError> {
    let expected = shape.size_bytes(dtype);
    if bytes.len() != expected {
        return Err(LinkError::ShapeMismatch {
            expected: format!("{expected} bytes for {dtype} {shape}"),
            actual: format!("{} bytes", bytes.len()),
        });
    }
    swap_if_needed(&mut bytes, dtype, order);
    Tensor::from_bytes(shape.clone(), dtype, bytes).map_err(|e| LinkError::ShapeMismatch {
        expected: format!("{dtype} {shape}"),
        actual: e.to_string(),
    })
}

/// Reads exactly one tensor of `shape` and `dtype` from `session`.
///
/// Issues a single `read_exact` for `prod(shape) × dtype.size_bytes()`
/// bytes and consumes nothing beyond them.
pub fn decode<T: Transport>(
    session: &mut SerialSession<T>,
    shape: &Shape,
    dtype: DType,
    order: ByteOrder,
) -> Result<Tensor, LinkError> {
    let bytes = session.read_exact(shape.size_bytes(dtype))?;
    decode_bytes(bytes, shape, dtype, order)
}

/// Sends the contract's input activation, trailer included.
pub fn write_tensor<T: Transport>(
    session: &mut SerialSession<T>,
    tensor: &TensorView<'_>,
    contract: &WireContract,
) -> Result<usize, LinkError> {
    contract.check_input(tensor)?;
    let mut frame = encode(tensor, contract.byte_order);
    if contract.integrity == Integrity::Crc32 {
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
    }
    session.write(&frame)?;
    session.flush()?;
    tracing::trace!("sent {} activation bytes ({})", frame.len(), contract.input_shape);
    Ok(frame.len())
}

/// Receives the contract's output activation, verifying the trailer if
/// one is configured.
pub fn read_tensor<T: Transport>(
    session: &mut SerialSession<T>,
    contract: &WireContract,
) -> Result<Tensor, LinkError> {
    match contract.integrity {
        Integrity::None => decode(
            session,
            &contract.output_shape,
            contract.dtype,
            contract.byte_order,
        ),
        Integrity::Crc32 => {
            let mut frame = session.read_exact(contract.output_frame_bytes())?;
            let trailer = frame.split_off(contract.output_bytes());
            let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let actual = crc32fast::hash(&frame);
            if expected != actual {
                return Err(LinkError::IntegrityMismatch { expected, actual });
            }
            decode_bytes(
                frame,
                &contract.output_shape,
                contract.dtype,
                contract.byte_order,
            )
        }
    }
}

fn swap_if_needed(bytes: &mut [u8], dtype: DType, order: ByteOrder) {
    let width = dtype.size_bytes();
    if width > 1 && !order.matches_host() {
        for elem in bytes.chunks_exact_mut(width) {
            elem.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;
    use std::time::Duration;

    fn session_with(incoming: &[u8]) -> (SerialSession<ScriptedTransport>, crate::mock::ScriptHandle) {
        let (transport, handle) = ScriptedTransport::new();
        (
            SerialSession::with_transport(
                transport.respond_with(incoming),
                "scripted",
                Duration::from_millis(100),
            ),
            handle,
        )
    }

    #[test]
    fn test_encode_length() {
        let t = Tensor::zeros(Shape::nchw(1, 32, 32, 32), DType::F32);
        assert_eq!(encode(&t.view(), ByteOrder::Little).len(), 131_072);
    }

    #[test]
    fn test_encode_explicit_orders() {
        let t = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        // 1.0f32 = 0x3F80_0000
        assert_eq!(encode(&t.view(), ByteOrder::Little), vec![0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(encode(&t.view(), ByteOrder::Big), vec![0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_row_major_flattening() {
        let t = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let wire = encode(&t.view(), ByteOrder::Little);
        let second = f32::from_le_bytes([wire[4], wire[5], wire[6], wire[7]]);
        assert_eq!(second, 2.0);
    }

    #[test]
    fn test_big_endian_round_trip_preserves_bits() {
        let values = [f32::NAN, -0.0, 0.0, f32::INFINITY, 1.5e-42];
        let t = Tensor::from_f32(Shape::vector(values.len()), &values).unwrap();
        let wire = encode(&t.view(), ByteOrder::Big);
        let back = decode_bytes(wire, t.shape(), DType::F32, ByteOrder::Big).unwrap();
        assert_eq!(back, t);
    }

    fn half_tensor(dtype: DType, values: &[u16]) -> Tensor {
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Tensor::from_bytes(Shape::vector(values.len()), dtype, bytes).unwrap()
    }

    #[test]
    fn test_f16_wire_bytes() {
        // 1.0f16 = 0x3C00, then a NaN with payload.
        let t = half_tensor(DType::F16, &[0x3C00, 0x7E01]);
        assert_eq!(&encode(&t.view(), ByteOrder::Big)[..2], &[0x3C, 0x00]);
        assert_eq!(&encode(&t.view(), ByteOrder::Little)[..2], &[0x00, 0x3C]);

        for order in [ByteOrder::Little, ByteOrder::Big] {
            let back = decode_bytes(encode(&t.view(), order), t.shape(), DType::F16, order).unwrap();
            assert_eq!(back, t);
        }
    }

    #[test]
    fn test_bf16_round_trip_through_session() {
        // 1.0bf16 = 0x3F80, -0.0bf16 = 0x8000.
        let t = half_tensor(DType::BF16, &[0x3F80, 0x8000, 0x0001]);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let contract = WireContract::new(t.shape().clone(), t.shape().clone(), DType::BF16)
                .with_byte_order(order);
            let (mut s, handle) = session_with(&[]);
            write_tensor(&mut s, &t.view(), &contract).unwrap();
            let frame = handle.written();
            let first = match order {
                ByteOrder::Little => [0x80, 0x3F],
                ByteOrder::Big => [0x3F, 0x80],
            };
            assert_eq!(&frame[..2], &first);

            let (mut s, _) = session_with(&frame);
            assert_eq!(read_tensor(&mut s, &contract).unwrap(), t);
        }
    }

    #[test]
    fn test_i8_ignores_byte_order() {
        let raw = vec![0x01, 0x80, 0xFF, 0x7F];
        let t = Tensor::from_bytes(Shape::matrix(2, 2), DType::I8, raw.clone()).unwrap();
        let little = encode(&t.view(), ByteOrder::Little);
        let big = encode(&t.view(), ByteOrder::Big);
        assert_eq!(little, raw);
        assert_eq!(big, raw);

        let (mut s, _) = session_with(&big);
        let back = decode(&mut s, t.shape(), DType::I8, ByteOrder::Big).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_decode_bytes_length_mismatch() {
        let err = decode_bytes(vec![0; 7], &Shape::vector(2), DType::F32, ByteOrder::Little)
            .unwrap_err();
        assert!(matches!(err, LinkError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_decode_consumes_exactly() {
        let t = Tensor::from_f32(Shape::vector(2), &[3.0, 4.0]).unwrap();
        let mut incoming = encode(&t.view(), ByteOrder::Little);
        incoming.extend_from_slice(&[0xEE, 0xFF]);

        let (mut s, handle) = session_with(&incoming);
        let back = decode(&mut s, &Shape::vector(2), DType::F32, ByteOrder::Little).unwrap();
        assert_eq!(back, t);
        assert_eq!(handle.remaining_incoming(), vec![0xEE, 0xFF]);
    }

    #[test]
    fn test_write_tensor_rejects_wrong_shape() {
        let contract = WireContract::new(Shape::vector(4), Shape::vector(4), DType::F32);
        let t = Tensor::zeros(Shape::vector(3), DType::F32);
        let (mut s, handle) = session_with(&[]);
        assert!(matches!(
            write_tensor(&mut s, &t.view(), &contract),
            Err(LinkError::ShapeMismatch { .. })
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_crc_trailer_round_trip() {
        let contract = WireContract::new(Shape::vector(2), Shape::vector(2), DType::F32)
            .with_integrity(Integrity::Crc32);
        assert_eq!(contract.input_frame_bytes(), 12);

        let t = Tensor::from_f32(Shape::vector(2), &[5.0, 6.0]).unwrap();
        let (mut s, handle) = session_with(&[]);
        write_tensor(&mut s, &t.view(), &contract).unwrap();
        let frame = handle.written();
        assert_eq!(frame.len(), 12);

        let (mut s, _) = session_with(&frame);
        assert_eq!(read_tensor(&mut s, &contract).unwrap(), t);
    }

    #[test]
    fn test_crc_mismatch() {
        let contract = WireContract::new(Shape::vector(1), Shape::vector(1), DType::F32)
            .with_integrity(Integrity::Crc32);
        let (mut s, _) = session_with(&[0, 0, 0x80, 0x3F, 0, 0, 0, 0]);
        assert!(matches!(
            read_tensor(&mut s, &contract),
            Err(LinkError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_contract_toml() {
        let c: WireContract = toml::from_str(
            r#"
            input_shape = [1, 32, 32, 32]
            output_shape = [1, 32, 32, 32]
            dtype = "f32"
            "#,
        )
        .unwrap();
        assert_eq!(c.byte_order, ByteOrder::Little);
        assert_eq!(c.integrity, Integrity::None);
        assert_eq!(c.input_bytes(), 131_072);
    }
}
