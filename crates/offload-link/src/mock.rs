// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-process transports for tests and demos.
//!
//! - [`ScriptedTransport`] records every byte written and replays a scripted
//!   byte stream on read. Partial reads, failing writes and stalls can be
//!   injected.
//! - [`LoopbackTransport`] plays the accelerator's side of the protocol:
//!   it checks the opcode sequence, consumes the weight blob and the input
//!   activation, and answers with the output of a host-side kernel.
//!
//! Both share their state with a [`ScriptHandle`] so a test can inspect the
//! wire after the session has been moved into the code under test.

use crate::codec::{self, ByteOrder, Integrity, WireContract};
use crate::{Connector, LinkError, Opcode, SerialSession, Transport};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tensor_core::{DType, Shape};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct State {
    written: Vec<u8>,
    incoming: VecDeque<u8>,
    read_chunk: Option<usize>,
    write_limit: Option<usize>,
    fail_reads: bool,
    read_timeout: Duration,
    read_calls: usize,
    flushes: usize,
    closes: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            written: Vec::new(),
            incoming: VecDeque::new(),
            read_chunk: None,
            write_limit: None,
            fail_reads: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_calls: 0,
            flushes: 0,
            closes: 0,
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Scripted transport ─────────────────────────────────────────

/// A transport that records writes and replays scripted reads.
///
/// With nothing left to deliver, a read blocks for the current read timeout
/// and then reports `TimedOut`, the way a silent serial line does.
#[derive(Debug)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

/// Inspection handle onto a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    /// Creates an empty transport and its handle.
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }

    /// Queues bytes to be returned by subsequent reads.
    pub fn respond_with(self, bytes: &[u8]) -> Self {
        lock(&self.state).incoming.extend(bytes.iter().copied());
        self
    }

    /// Caps each read at `chunk` bytes.
    pub fn deliver_in_chunks(self, chunk: usize) -> Self {
        lock(&self.state).read_chunk = Some(chunk.max(1));
        self
    }

    /// Accepts only the first `limit` bytes written; every later write
    /// fails with `BrokenPipe`.
    pub fn fail_writes_after(self, limit: usize) -> Self {
        lock(&self.state).write_limit = Some(limit);
        self
    }

    /// Makes every read fail with a hard I/O error.
    pub fn fail_reads(self) -> Self {
        lock(&self.state).fail_reads = true;
        self
    }

    fn push_incoming(&self, bytes: &[u8]) {
        lock(&self.state).incoming.extend(bytes.iter().copied());
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = {
            let mut st = lock(&self.state);
            st.read_calls += 1;
            if st.fail_reads {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted read failure"));
            }
            if !st.incoming.is_empty() {
                let limit = st.read_chunk.unwrap_or(usize::MAX);
                let n = buf.len().min(limit).min(st.incoming.len());
                for (slot, byte) in buf.iter_mut().zip(st.incoming.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            st.read_timeout
        };
        std::thread::sleep(timeout);
        Err(io::Error::new(ErrorKind::TimedOut, "no scripted bytes left"))
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = lock(&self.state);
        let accept = match st.write_limit {
            Some(limit) if st.written.len() >= limit => {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted write failure"));
            }
            Some(limit) => buf.len().min(limit - st.written.len()),
            None => buf.len(),
        };
        st.written.extend_from_slice(&buf[..accept]);
        Ok(accept)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.state).flushes += 1;
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        lock(&self.state).read_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        lock(&self.state).closes += 1;
        Ok(())
    }
}

impl ScriptHandle {
    /// Every byte the transport has accepted, in order.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Number of bytes still queued for reading.
    pub fn pending_incoming(&self) -> usize {
        lock(&self.state).incoming.len()
    }

    /// The bytes still queued for reading.
    pub fn remaining_incoming(&self) -> Vec<u8> {
        lock(&self.state).incoming.iter().copied().collect()
    }

    pub fn read_calls(&self) -> usize {
        lock(&self.state).read_calls
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.state).flushes
    }

    /// How many times the transport has been closed.
    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }
}

/// Hands out pre-built [`ScriptedTransport`]s, one per `connect`.
///
/// Once the queue is exhausted every `connect` fails with
/// [`LinkError::LinkUnavailable`].
#[derive(Debug)]
pub struct ScriptedConnector {
    queue: Mutex<VecDeque<ScriptedTransport>>,
    read_timeout: Duration,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            read_timeout,
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose device never opens.
    pub fn unavailable() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }

    /// Queues a transport for the next `connect`.
    pub fn push(self, transport: ScriptedTransport) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(transport);
        self
    }

    /// Successful and failed `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(&self) -> Result<SerialSession<ScriptedTransport>, LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(transport) => Ok(SerialSession::with_transport(
                transport,
                "scripted",
                self.read_timeout,
            )),
            None => Err(LinkError::LinkUnavailable {
                device: "scripted".into(),
                detail: "no scripted transport queued".into(),
            }),
        }
    }

    fn describe(&self) -> String {
        "scripted transport".into()
    }
}

// ── Loopback accelerator ───────────────────────────────────────

/// Computes an output payload from `(weights, input)` wire bytes.
pub type Kernel = Arc<dyn Fn(&[u8], &[u8]) -> Vec<u8> + Send + Sync>;

/// What a [`LoopbackTransport`] expects and how it answers.
#[derive(Clone)]
pub struct LoopbackSpec {
    weight_bytes: usize,
    input_bytes: usize,
    integrity: Integrity,
    kernel: Kernel,
}

impl LoopbackSpec {
    /// Expects `weight_bytes` of weights and `input_bytes` of activation and
    /// answers with `kernel(weights, input)`.
    pub fn new(weight_bytes: usize, input_bytes: usize, kernel: Kernel) -> Self {
        Self {
            weight_bytes,
            input_bytes,
            integrity: Integrity::None,
            kernel,
        }
    }

    /// Sends the input activation straight back.
    pub fn echo(weight_bytes: usize, input_bytes: usize) -> Self {
        Self::new(weight_bytes, input_bytes, Arc::new(|_: &[u8], input: &[u8]| input.to_vec()))
    }

    /// Applies `f` to every `f32` element of the activation, honouring the
    /// contract's byte order and trailer.
    ///
    /// Only valid for contracts whose input and output geometry match.
    pub fn map_f32<F>(weight_bytes: usize, contract: &WireContract, f: F) -> Self
    where
        F: Fn(f32) -> f32 + Send + Sync + 'static,
    {
        let order = contract.byte_order;
        let shape = contract.input_shape.clone();
        let kernel: Kernel =
            Arc::new(move |_: &[u8], input: &[u8]| map_f32_payload(input, &shape, order, &f));
        Self {
            weight_bytes,
            input_bytes: contract.input_bytes(),
            integrity: contract.integrity,
            kernel,
        }
    }

    pub fn with_integrity(mut self, integrity: Integrity) -> Self {
        self.integrity = integrity;
        self
    }
}

impl std::fmt::Debug for LoopbackSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSpec")
            .field("weight_bytes", &self.weight_bytes)
            .field("input_bytes", &self.input_bytes)
            .field("integrity", &self.integrity)
            .finish_non_exhaustive()
    }
}

fn map_f32_payload<F: Fn(f32) -> f32>(input: &[u8], shape: &Shape, order: ByteOrder, f: &F) -> Vec<u8> {
    // A malformed payload is answered with itself; the host's decoder then
    // reports the mismatch.
    let Ok(tensor) = codec::decode_bytes(input.to_vec(), shape, DType::F32, order) else {
        return input.to_vec();
    };
    let Ok(values) = tensor.to_f32_vec() else {
        return input.to_vec();
    };
    let mapped: Vec<f32> = values.into_iter().map(f).collect();
    match tensor_core::Tensor::from_f32(shape.clone(), &mapped) {
        Ok(out) => codec::encode(&out.view(), order),
        Err(_) => input.to_vec(),
    }
}

#[derive(Debug)]
enum Stage {
    LoadOpcode,
    Weights,
    ExecOpcode,
    Input,
}

/// An in-process stand-in for the accelerator.
///
/// Drives the device side of one exchange per `LOAD_WEIGHTS` opcode: any
/// byte out of sequence fails the write with `InvalidData`.
pub struct LoopbackTransport {
    inner: ScriptedTransport,
    spec: LoopbackSpec,
    stage: Stage,
    weights: Vec<u8>,
    input: Vec<u8>,
}

impl LoopbackTransport {
    pub fn new(spec: LoopbackSpec) -> (Self, ScriptHandle) {
        let (inner, handle) = ScriptedTransport::new();
        (
            Self {
                inner,
                spec,
                stage: Stage::LoadOpcode,
                weights: Vec::new(),
                input: Vec::new(),
            },
            handle,
        )
    }

    fn input_frame_bytes(&self) -> usize {
        self.spec.input_bytes + self.spec.integrity.trailer_bytes()
    }

    fn feed(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while let Some((&first, rest)) = bytes.split_first() {
            match self.stage {
                Stage::LoadOpcode => {
                    expect_opcode(first, Opcode::LoadWeights)?;
                    self.weights.clear();
                    self.stage = Stage::Weights;
                    bytes = rest;
                }
                Stage::Weights => {
                    let take = (self.spec.weight_bytes - self.weights.len()).min(bytes.len());
                    self.weights.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];
                }
                Stage::ExecOpcode => {
                    expect_opcode(first, Opcode::ExecuteLayer)?;
                    self.input.clear();
                    self.stage = Stage::Input;
                    bytes = rest;
                }
                Stage::Input => {
                    let take = (self.input_frame_bytes() - self.input.len()).min(bytes.len());
                    self.input.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];
                }
            }
            self.advance()?;
        }
        // A zero-length weight blob completes as soon as the opcode lands.
        self.advance()
    }

    fn advance(&mut self) -> io::Result<()> {
        match self.stage {
            Stage::Weights if self.weights.len() == self.spec.weight_bytes => {
                self.stage = Stage::ExecOpcode;
            }
            Stage::Input if self.input.len() == self.input_frame_bytes() => {
                let response = self.respond()?;
                self.inner.push_incoming(&response);
                self.stage = Stage::LoadOpcode;
            }
            _ => {}
        }
        Ok(())
    }

    fn respond(&self) -> io::Result<Vec<u8>> {
        let (payload, trailer) = self.input.split_at(self.spec.input_bytes);
        if self.spec.integrity == Integrity::Crc32 {
            let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            if crc32fast::hash(payload) != expected {
                return Err(io::Error::new(ErrorKind::InvalidData, "input crc32 mismatch"));
            }
        }
        let mut out = (self.spec.kernel)(&self.weights, payload);
        if self.spec.integrity == Integrity::Crc32 {
            let crc = crc32fast::hash(&out);
            out.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(out)
    }
}

fn expect_opcode(byte: u8, expected: Opcode) -> io::Result<()> {
    match Opcode::try_from(byte) {
        Ok(op) if op == expected => Ok(()),
        Ok(op) => Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("expected {expected}, got {op}"),
        )),
        Err(raw) => Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("expected {expected}, got unknown byte {raw:#010b}"),
        )),
    }
}

impl Read for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LoopbackTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.feed(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Transport for LoopbackTransport {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}

/// Opens a fresh [`LoopbackTransport`] per `connect`, cycling through one
/// spec per offload point.
pub struct LoopbackConnector {
    specs: Vec<LoopbackSpec>,
    next: AtomicUsize,
    read_timeout: Duration,
    handles: Mutex<Vec<ScriptHandle>>,
}

impl LoopbackConnector {
    pub fn new(specs: Vec<LoopbackSpec>, read_timeout: Duration) -> Self {
        Self {
            specs,
            next: AtomicUsize::new(0),
            read_timeout,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Handles for every transport opened so far, in connect order.
    pub fn handles(&self) -> Vec<ScriptHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    fn connect(&self) -> Result<SerialSession<LoopbackTransport>, LinkError> {
        if self.specs.is_empty() {
            return Err(LinkError::LinkUnavailable {
                device: "loopback".into(),
                detail: "no loopback specs configured".into(),
            });
        }
        let i = self.next.fetch_add(1, Ordering::SeqCst) % self.specs.len();
        let (transport, handle) = LoopbackTransport::new(self.specs[i].clone());
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(SerialSession::with_transport(
            transport,
            "loopback",
            self.read_timeout,
        ))
    }

    fn describe(&self) -> String {
        format!("in-process loopback ({} offload points)", self.specs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_opcode;

    #[test]
    fn test_scripted_handle_sees_writes_after_move() {
        let (transport, handle) = ScriptedTransport::new();
        let mut session = SerialSession::with_transport(transport, "t", DEFAULT_READ_TIMEOUT);
        session.write(&[0xAB]).unwrap();
        drop(session);
        assert_eq!(handle.written(), vec![0xAB]);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_scripted_connector_exhausts() {
        let (t, _) = ScriptedTransport::new();
        let connector = ScriptedConnector::new(DEFAULT_READ_TIMEOUT).push(t);
        assert!(connector.connect().is_ok());
        assert!(matches!(
            connector.connect(),
            Err(LinkError::LinkUnavailable { .. })
        ));
        assert_eq!(connector.connects(), 2);
    }

    #[test]
    fn test_loopback_echo_exchange() {
        let (transport, handle) = LoopbackTransport::new(LoopbackSpec::echo(3, 2));
        let mut s = SerialSession::with_transport(transport, "loop", Duration::from_millis(100));

        write_opcode(&mut s, Opcode::LoadWeights).unwrap();
        s.write(&[1, 2, 3]).unwrap();
        write_opcode(&mut s, Opcode::ExecuteLayer).unwrap();
        s.write(&[9, 8]).unwrap();

        assert_eq!(s.read_exact(2).unwrap(), vec![9, 8]);
        assert_eq!(handle.written(), vec![0xA8, 1, 2, 3, 0x20, 9, 8]);
    }

    #[test]
    fn test_loopback_zero_weight_bytes() {
        let (transport, _) = LoopbackTransport::new(LoopbackSpec::echo(0, 1));
        let mut s = SerialSession::with_transport(transport, "loop", Duration::from_millis(100));
        write_opcode(&mut s, Opcode::LoadWeights).unwrap();
        write_opcode(&mut s, Opcode::ExecuteLayer).unwrap();
        s.write(&[5]).unwrap();
        assert_eq!(s.read_exact(1).unwrap(), vec![5]);
    }

    #[test]
    fn test_loopback_rejects_out_of_order_opcode() {
        let (transport, _) = LoopbackTransport::new(LoopbackSpec::echo(1, 1));
        let mut s = SerialSession::with_transport(transport, "loop", Duration::from_millis(100));
        assert!(matches!(
            write_opcode(&mut s, Opcode::ExecuteLayer),
            Err(LinkError::LinkWriteError { .. })
        ));
    }

    #[test]
    fn test_loopback_map_f32() {
        let contract = WireContract::new(Shape::vector(2), Shape::vector(2), DType::F32);
        let spec = LoopbackSpec::map_f32(0, &contract, |x| x * 2.0);
        let (transport, _) = LoopbackTransport::new(spec);
        let mut s = SerialSession::with_transport(transport, "loop", Duration::from_millis(100));

        let input = tensor_core::Tensor::from_f32(Shape::vector(2), &[1.5, -3.0]).unwrap();
        write_opcode(&mut s, Opcode::LoadWeights).unwrap();
        write_opcode(&mut s, Opcode::ExecuteLayer).unwrap();
        codec::write_tensor(&mut s, &input.view(), &contract).unwrap();
        let out = codec::read_tensor(&mut s, &contract).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![3.0, -6.0]);
    }
}
