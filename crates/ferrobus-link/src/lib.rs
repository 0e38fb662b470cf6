//! Modbus transports, frame-boundary timing and the slave engine.
//!
//! The transport layer abstracts a serial line, a TCP client connection or an
//! externally adopted socket behind one [`Transport`] value. Frame boundaries
//! are recovered with the dual-timeout policy of [`framing`]: the first
//! response byte is awaited up to the response timeout, and an inter-byte
//! idle gap marks the end of a frame.

#![forbid(unsafe_code)]

pub mod bank;
pub mod framing;
pub mod slave;
pub mod transport;

pub use bank::{CoilBank, InMemoryDevice, RegisterBank};
pub use framing::Timeouts;
pub use slave::{DeviceService, ModbusSlave, PointError, Tick};
#[cfg(feature = "serial")]
pub use transport::SerialConfig;
pub use transport::{TcpConfig, Transport, TransportKind};

use ferrobus_core::{DecodeError, EncodeError};
use thiserror::Error;

/// Which frame wrapper an instance speaks.
///
/// Defaults from the transport kind (serial carries RTU, sockets carry TCP)
/// but can be overridden, e.g. for RTU tunnelled over a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Rtu,
    Tcp,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport is not open")]
    NotOpen,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}
