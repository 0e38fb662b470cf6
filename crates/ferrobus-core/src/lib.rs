//! Modbus protocol encoding and framing in pure Rust.
//!
//! `ferrobus-core` provides zero-copy, `no_std`-compatible encoding and
//! decoding of Modbus PDUs and of the RTU and TCP (MBAP) frame wrappers
//! around them. It performs no I/O; every operation works on caller-provided
//! byte slices.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(any(feature = "rtu", feature = "tcp")))]
compile_error!("at least one of the `rtu` and `tcp` features must be enabled");

pub mod encoding;
pub mod error;
pub mod frame;
pub mod pdu;

pub use error::{DecodeError, EncodeError};

/// Largest PDU that fits a Modbus frame: function code plus 252 data bytes.
pub const MAX_PDU_LEN: usize = 253;

/// Largest RTU frame: address byte, PDU, CRC-16.
#[cfg(feature = "rtu")]
pub const MAX_RTU_FRAME_LEN: usize = 256;

/// Largest TCP frame: 7-byte MBAP header plus PDU.
#[cfg(feature = "tcp")]
pub const MAX_TCP_FRAME_LEN: usize = 260;
