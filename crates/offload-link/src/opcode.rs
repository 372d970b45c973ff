// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The accelerator instruction set.
//!
//! Opcode values are a compile-time contract with the FPGA firmware. There
//! is no negotiation or versioning on the wire, so a value here must never
//! change once firmware depends on it. New instructions get new bytes.

use crate::{LinkError, SerialSession, Transport};

/// A single-byte accelerator instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// The following stream is the layer's weight blob.
    LoadWeights = 0b1010_1000,
    /// The following stream is the input activation; run the layer on it.
    ExecuteLayer = 0b0010_0000,
}

impl Opcode {
    /// All opcodes, in wire-value order.
    pub const ALL: [Opcode; 2] = [Opcode::ExecuteLayer, Opcode::LoadWeights];

    /// Returns the wire byte for this opcode.
    pub const fn encode(self) -> u8 {
        self as u8
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::LoadWeights => "LOAD_WEIGHTS",
            Opcode::ExecuteLayer => "EXECUTE_LAYER",
        }
    }
}

impl TryFrom<u8> for Opcode {
    /// The unrecognised byte.
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.encode() == byte)
            .ok_or(byte)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010b})", self.as_str(), self.encode())
    }
}

/// Writes a single opcode byte to the session.
pub fn write_opcode<T: Transport>(
    session: &mut SerialSession<T>,
    opcode: Opcode,
) -> Result<(), LinkError> {
    tracing::debug!("sending opcode {opcode}");
    session.write(&[opcode.encode()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(Opcode::LoadWeights.encode(), 0xA8);
        assert_eq!(Opcode::ExecuteLayer.encode(), 0x20);
    }

    #[test]
    fn test_encode_is_stable_across_calls() {
        let first: Vec<u8> = (0..16)
            .flat_map(|_| [Opcode::ExecuteLayer.encode(), Opcode::LoadWeights.encode()])
            .collect();
        let again: Vec<u8> = (0..16)
            .flat_map(|_| [Opcode::ExecuteLayer.encode(), Opcode::LoadWeights.encode()])
            .collect();
        assert_eq!(first, again);
        assert!(first.chunks(2).all(|pair| pair == [0x20, 0xA8]));
    }

    #[test]
    fn test_opcodes_are_distinct() {
        assert_ne!(Opcode::LoadWeights.encode(), Opcode::ExecuteLayer.encode());
    }

    #[test]
    fn test_try_from() {
        assert_eq!(Opcode::try_from(0xA8), Ok(Opcode::LoadWeights));
        assert_eq!(Opcode::try_from(0x20), Ok(Opcode::ExecuteLayer));
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::LoadWeights.to_string(), "LOAD_WEIGHTS (0b10101000)");
    }
}
