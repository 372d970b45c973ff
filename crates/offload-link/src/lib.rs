// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # offload-link
//!
//! The host side of the FPGA offload protocol over a byte-oriented serial
//! link.
//!
//! # Wire exchange
//!
//! One offload is one session and one fixed sequence of unframed streams:
//!
//! ```text
//! host → fpga   [LoadWeights]  1 byte   (0b1010_1000)
//! host → fpga   weight blob    N bytes  (raw file contents)
//! host → fpga   [ExecuteLayer] 1 byte   (0b0010_0000)
//! host → fpga   activation     prod(input_shape)  × dtype size
//! fpga → host   activation     prod(output_shape) × dtype size
//! ```
//!
//! There are no length prefixes, delimiters or checksums in the production
//! frame. Both sides agree on every length out of band, which is what the
//! per-layer [`WireContract`] records. An under-read desynchronises every
//! later exchange, so [`SerialSession::read_exact`] loops over partial reads
//! under a mandatory deadline.
//!
//! # Components
//! - [`SerialSession`] / [`Connector`]: scoped ownership of the link.
//! - [`Opcode`]: the closed instruction set.
//! - [`WeightBlob`], [`WeightCache`], [`stream_weights`]: chunked weight transfer.
//! - [`codec`]: tensor encode/decode in an explicit byte order, with an
//!   optional CRC-32 trailer for debugging.
//! - [`mock`]: scripted and loopback transports for tests and demos.

pub mod codec;
mod error;
pub mod mock;
mod opcode;
mod session;
mod weights;

pub use codec::{ByteOrder, Integrity, WireContract, MAX_FRAME_BYTES};
pub use error::LinkError;
pub use opcode::{write_opcode, Opcode};
pub use session::{Connector, DeviceConfig, Parity, SerialConnector, SerialSession, Transport};
pub use weights::{stream_weights, WeightBlob, WeightCache, WEIGHT_CHUNK_BYTES};
