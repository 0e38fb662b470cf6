//! Frame wrappers around a PDU: RTU (address + CRC-16) and TCP (MBAP).

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;
