// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Serial session lifecycle.
//!
//! A [`SerialSession`] owns one open transport for the duration of one
//! offload. It is closed explicitly on the success path and by `Drop` on
//! every other path, so a failed write or a read timeout never leaks the
//! descriptor.
//!
//! The session is generic over [`Transport`] so the protocol can be driven
//! by a real serial port or by the scripted transports in [`crate::mock`].

use crate::LinkError;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Default baud rate agreed with the accelerator firmware.
const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read deadline for one `read_exact` call.
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Back-off used when a transport reports "no data" without blocking.
const IDLE_POLL: Duration = Duration::from_millis(1);

// ── Transport ──────────────────────────────────────────────────

/// The byte channel underneath a [`SerialSession`].
pub trait Transport: Read + Write + Send {
    /// Bounds how long the next `read` may block.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Releases the underlying handle. Called at most once per session.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

// ── Device configuration ───────────────────────────────────────

/// Parity setting for the serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// How to open the accelerator's serial device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// Line speed in baud.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits per character (5–8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity bit setting.
    #[serde(default)]
    pub parity: Parity,
    /// Stop bits (1 or 2).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Deadline for each `read_exact` call, in milliseconds. Must be non-zero.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl DeviceConfig {
    /// Creates an 8N1 configuration at the default baud rate.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// Returns the read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Checks the line settings without touching the device.
    pub fn validate(&self) -> Result<(), LinkError> {
        let invalid = |detail: String| LinkError::LinkUnavailable {
            device: self.path.clone(),
            detail,
        };
        if self.path.trim().is_empty() {
            return Err(invalid("device path is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud rate must be non-zero".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(invalid("read timeout must be non-zero".into()));
        }
        self.serial_data_bits().map_err(invalid)?;
        self.serial_stop_bits().map_err(invalid)?;
        Ok(())
    }

    fn serial_data_bits(&self) -> Result<serialport::DataBits, String> {
        match self.data_bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            other => Err(format!("unsupported data bits {other}; expected 5-8")),
        }
    }

    fn serial_stop_bits(&self) -> Result<serialport::StopBits, String> {
        match self.stop_bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            other => Err(format!("unsupported stop bits {other}; expected 1 or 2")),
        }
    }

    fn serial_parity(&self) -> serialport::Parity {
        match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

// ── Session ────────────────────────────────────────────────────

/// An open, exclusively owned channel to the accelerator.
///
/// Not reentrant: every method takes `&mut self`, so one session can only
/// ever serve one exchange at a time.
pub struct SerialSession<T: Transport = Box<dyn serialport::SerialPort>> {
    transport: Option<T>,
    device: String,
    read_timeout: Duration,
    bytes_written: usize,
    bytes_read: usize,
}

impl SerialSession<Box<dyn serialport::SerialPort>> {
    /// Opens and configures the serial device described by `config`.
    ///
    /// # Errors
    /// [`LinkError::LinkUnavailable`] if the configuration is invalid or the
    /// device cannot be opened (missing, busy, permission denied).
    pub fn open(config: &DeviceConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let unavailable = |detail: String| LinkError::LinkUnavailable {
            device: config.path.clone(),
            detail,
        };

        let port = serialport::new(config.path.as_str(), config.baud_rate)
            .data_bits(config.serial_data_bits().map_err(unavailable)?)
            .parity(config.serial_parity())
            .stop_bits(config.serial_stop_bits().map_err(unavailable)?)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| unavailable(e.to_string()))?;

        tracing::info!(
            "serial session opened on {} ({} baud, {}{}{}, timeout {:?})",
            config.path,
            config.baud_rate,
            config.data_bits,
            match config.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            config.stop_bits,
            config.read_timeout(),
        );

        Ok(Self::with_transport(
            port,
            config.path.clone(),
            config.read_timeout(),
        ))
    }
}

impl<T: Transport> SerialSession<T> {
    /// Wraps an already-open transport.
    pub fn with_transport(transport: T, device: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            device: device.into(),
            read_timeout,
            bytes_written: 0,
            bytes_read: 0,
        }
    }

    /// Returns the device name this session was opened on.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns `true` until [`close`](Self::close) has run.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Returns the deadline applied to each `read_exact` call.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Total bytes accepted by the transport so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Total bytes received from the transport so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Writes every byte of `bytes` or fails.
    ///
    /// Partial writes from the transport are continued; a transport error or
    /// a zero-length write aborts with [`LinkError::LinkWriteError`]. A
    /// failed write leaves the stream in an unknown state, so the session
    /// must not be reused for the same exchange.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let transport = self.transport.as_mut().ok_or(LinkError::SessionClosed)?;
        let expected = bytes.len();
        let mut written = 0;

        while written < expected {
            match transport.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(LinkError::LinkWriteError {
                        written,
                        expected,
                        source: io::Error::new(ErrorKind::WriteZero, "transport accepted no bytes"),
                    });
                }
                Ok(n) => {
                    written += n;
                    self.bytes_written += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(LinkError::LinkWriteError {
                        written,
                        expected,
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    /// Flushes buffered output to the device.
    pub fn flush(&mut self) -> Result<(), LinkError> {
        let transport = self.transport.as_mut().ok_or(LinkError::SessionClosed)?;
        transport.flush().map_err(|source| LinkError::LinkWriteError {
            written: 0,
            expected: 0,
            source,
        })
    }

    /// Reads exactly `n` bytes, blocking until they arrive or the session's
    /// read deadline passes.
    ///
    /// The deadline covers the whole call, not each underlying read: partial
    /// deliveries are accumulated, and each transport read is bounded by the
    /// time remaining.
    ///
    /// # Errors
    /// - [`LinkError::LinkTimeout`] if fewer than `n` bytes arrived in time.
    /// - [`LinkError::LinkReadError`] on a hard transport failure.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, LinkError> {
        let timeout = self.read_timeout;
        let transport = self.transport.as_mut().ok_or(LinkError::SessionClosed)?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::LinkTimeout {
                    expected: n,
                    received: filled,
                    timeout,
                });
            }
            let remaining = deadline - now;

            transport
                .set_read_timeout(remaining)
                .map_err(|source| LinkError::LinkReadError {
                    received: filled,
                    expected: n,
                    source,
                })?;

            match transport.read(&mut buf[filled..]) {
                Ok(0) => std::thread::sleep(IDLE_POLL.min(remaining)),
                Ok(k) => {
                    filled += k;
                    self.bytes_read += k;
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(source) => {
                    return Err(LinkError::LinkReadError {
                        received: filled,
                        expected: n,
                        source,
                    });
                }
            }
        }

        tracing::trace!("read {n} bytes from {}", self.device);
        Ok(buf)
    }

    /// Releases the transport. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.flush() {
                tracing::warn!("flush on close of {} failed: {e}", self.device);
            }
            if let Err(e) = transport.close() {
                tracing::warn!("close of {} failed: {e}", self.device);
            }
            tracing::info!(
                "serial session on {} closed ({} bytes out, {} bytes in)",
                self.device,
                self.bytes_written,
                self.bytes_read,
            );
        }
    }
}

impl<T: Transport> Drop for SerialSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> std::fmt::Debug for SerialSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .field("read_timeout", &self.read_timeout)
            .field("bytes_written", &self.bytes_written)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

// ── Connectors ─────────────────────────────────────────────────

/// Produces a fresh session for each offload.
pub trait Connector {
    /// The transport type of the sessions this connector opens.
    type Transport: Transport;

    /// Opens a new session.
    fn connect(&self) -> Result<SerialSession<Self::Transport>, LinkError>;

    /// Short description of the target, for logs.
    fn describe(&self) -> String;
}

/// Opens real serial devices.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: DeviceConfig,
}

impl SerialConnector {
    /// Creates a connector for the given device.
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Returns the device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }
}

impl Connector for SerialConnector {
    type Transport = Box<dyn serialport::SerialPort>;

    fn connect(&self) -> Result<SerialSession<Self::Transport>, LinkError> {
        SerialSession::open(&self.config)
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.path, self.config.baud_rate)
    }
}
