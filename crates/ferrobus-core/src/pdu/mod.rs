//! PDU codec: function codes, request and response shapes, exceptions.

pub mod exception;
pub mod function_code;
pub mod request;
pub mod response;

pub use exception::{ExceptionCode, ExceptionResponse};
pub use function_code::FunctionCode;
pub use request::*;
pub use response::*;

pub(crate) const MAX_READ_BITS: u16 = 2000;
pub(crate) const MAX_READ_REGISTERS: u16 = 125;
pub(crate) const MAX_WRITE_COILS: u16 = 1968;
pub(crate) const MAX_WRITE_REGISTERS: u16 = 123;
pub(crate) const MAX_RW_WRITE_REGISTERS: u16 = 121;
