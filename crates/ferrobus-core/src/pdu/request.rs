use crate::encoding::{bits, Reader, Writer};
use crate::pdu::FunctionCode;
use crate::{DecodeError, EncodeError};

use super::{
    MAX_READ_BITS, MAX_READ_REGISTERS, MAX_RW_WRITE_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

fn validate_quantity(quantity: u16, max: u16) -> Result<(), EncodeError> {
    if quantity == 0 || quantity > max {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(())
}

fn validate_quantity_decode(quantity: u16, max: u16) -> Result<(), DecodeError> {
    if quantity == 0 || quantity > max {
        return Err(DecodeError::InvalidValue);
    }
    Ok(())
}

fn write_header(
    w: &mut Writer<'_>,
    function: FunctionCode,
    start_address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    w.write_u8(function.as_u8())?;
    w.write_be_u16(start_address)?;
    w.write_be_u16(quantity)?;
    Ok(())
}

fn pack_coils(values: &[bool], out: &mut [u8]) {
    out.fill(0);
    for (i, value) in values.iter().enumerate() {
        bits::set(out, i, *value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCoilsRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadCoilsRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_BITS)?;
        write_header(w, FunctionCode::ReadCoils, self.start_address, self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDiscreteInputsRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadDiscreteInputsRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_BITS)?;
        write_header(
            w,
            FunctionCode::ReadDiscreteInputs,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHoldingRegistersRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadHoldingRegistersRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_REGISTERS)?;
        write_header(
            w,
            FunctionCode::ReadHoldingRegisters,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadInputRegistersRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadInputRegistersRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_REGISTERS)?;
        write_header(
            w,
            FunctionCode::ReadInputRegisters,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoilRequest {
    pub address: u16,
    pub value: bool,
}

impl WriteSingleCoilRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::WriteSingleCoil.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(if self.value { 0xFF00 } else { 0x0000 })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegisterRequest {
    pub address: u16,
    pub value: u16,
}

impl WriteSingleRegisterRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::WriteSingleRegister.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.value)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest<'a> {
    pub start_address: u16,
    pub values: &'a [bool],
}

impl<'a> WriteMultipleCoilsRequest<'a> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_WRITE_COILS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count_usize = bits::byte_count(self.values.len());
        let byte_count: u8 = byte_count_usize
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;

        w.write_u8(FunctionCode::WriteMultipleCoils.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8(byte_count)?;

        let mut packed = [0u8; 246];
        let used = usize::from(byte_count);
        pack_coils(self.values, &mut packed[..used]);
        w.write_all(&packed[..used])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest<'a> {
    pub start_address: u16,
    pub values: &'a [u16],
}

impl<'a> WriteMultipleRegistersRequest<'a> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_WRITE_REGISTERS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count: u8 = (self.values.len() * 2)
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;

        w.write_u8(FunctionCode::WriteMultipleRegisters.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8(byte_count)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteRegisterRequest {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
}

impl MaskWriteRegisterRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::MaskWriteRegister.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.and_mask)?;
        w.write_be_u16(self.or_mask)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteMultipleRegistersRequest<'a> {
    pub read_start_address: u16,
    pub read_quantity: u16,
    pub write_start_address: u16,
    pub values: &'a [u16],
}

impl<'a> ReadWriteMultipleRegistersRequest<'a> {
    pub fn write_quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_RW_WRITE_REGISTERS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.read_quantity, MAX_READ_REGISTERS)?;
        let write_quantity = self.write_quantity()?;
        let byte_count = u8::try_from(usize::from(write_quantity) * 2)
            .map_err(|_| EncodeError::ValueOutOfRange)?;

        w.write_u8(FunctionCode::ReadWriteMultipleRegisters.as_u8())?;
        w.write_be_u16(self.read_start_address)?;
        w.write_be_u16(self.read_quantity)?;
        w.write_be_u16(self.write_start_address)?;
        w.write_be_u16(write_quantity)?;
        w.write_u8(byte_count)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

/// Borrowed decode representation for FC15 payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequestData<'a> {
    pub start_address: u16,
    pub quantity: u16,
    pub values_packed: &'a [u8],
}

impl<'a> WriteMultipleCoilsRequestData<'a> {
    pub fn coil(&self, index: usize) -> Option<bool> {
        if index >= usize::from(self.quantity) {
            return None;
        }
        self.values_packed
            .get(index / 8)
            .map(|byte| (byte & (1u8 << (index % 8))) != 0)
    }
}

/// Borrowed decode representation for FC16 payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequestData<'a> {
    pub start_address: u16,
    pub values_bytes: &'a [u8],
}

impl<'a> WriteMultipleRegistersRequestData<'a> {
    pub fn quantity(&self) -> usize {
        self.values_bytes.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let bytes = self.values_bytes.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteMultipleRegistersRequestData<'a> {
    pub read_start_address: u16,
    pub read_quantity: u16,
    pub write_start_address: u16,
    pub values_bytes: &'a [u8],
}

impl<'a> ReadWriteMultipleRegistersRequestData<'a> {
    pub fn write_quantity(&self) -> usize {
        self.values_bytes.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let bytes = self.values_bytes.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

/// A request PDU the master can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(ReadCoilsRequest),
    ReadDiscreteInputs(ReadDiscreteInputsRequest),
    ReadHoldingRegisters(ReadHoldingRegistersRequest),
    ReadInputRegisters(ReadInputRegistersRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequest<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequest<'a>),
    MaskWriteRegister(MaskWriteRegisterRequest),
    ReadWriteMultipleRegisters(ReadWriteMultipleRegistersRequest<'a>),
}

impl<'a> Request<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::ReadCoils(req) => req.encode(w),
            Self::ReadDiscreteInputs(req) => req.encode(w),
            Self::ReadHoldingRegisters(req) => req.encode(w),
            Self::ReadInputRegisters(req) => req.encode(w),
            Self::WriteSingleCoil(req) => req.encode(w),
            Self::WriteSingleRegister(req) => req.encode(w),
            Self::WriteMultipleCoils(req) => req.encode(w),
            Self::WriteMultipleRegisters(req) => req.encode(w),
            Self::MaskWriteRegister(req) => req.encode(w),
            Self::ReadWriteMultipleRegisters(req) => req.encode(w),
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            Self::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
        }
    }
}

/// Decoded request model used by the slave engine.
///
/// Payload-carrying variants borrow from the frame buffer the request was
/// parsed out of; the borrow is only valid until that buffer is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRequest<'a> {
    ReadCoils(ReadCoilsRequest),
    ReadDiscreteInputs(ReadDiscreteInputsRequest),
    ReadHoldingRegisters(ReadHoldingRegistersRequest),
    ReadInputRegisters(ReadInputRegistersRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequestData<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequestData<'a>),
    MaskWriteRegister(MaskWriteRegisterRequest),
    ReadWriteMultipleRegisters(ReadWriteMultipleRegistersRequestData<'a>),
}

impl<'a> DecodedRequest<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            Self::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
        }
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let function = FunctionCode::from_u8(r.read_u8()?)?;
        match function {
            FunctionCode::ReadCoils => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_READ_BITS)?;
                Ok(Self::ReadCoils(ReadCoilsRequest {
                    start_address,
                    quantity,
                }))
            }
            FunctionCode::ReadDiscreteInputs => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_READ_BITS)?;
                Ok(Self::ReadDiscreteInputs(ReadDiscreteInputsRequest {
                    start_address,
                    quantity,
                }))
            }
            FunctionCode::ReadHoldingRegisters => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_READ_REGISTERS)?;
                Ok(Self::ReadHoldingRegisters(ReadHoldingRegistersRequest {
                    start_address,
                    quantity,
                }))
            }
            FunctionCode::ReadInputRegisters => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_READ_REGISTERS)?;
                Ok(Self::ReadInputRegisters(ReadInputRegistersRequest {
                    start_address,
                    quantity,
                }))
            }
            FunctionCode::WriteSingleCoil => {
                let address = r.read_be_u16()?;
                let value = match r.read_be_u16()? {
                    0xFF00 => true,
                    0x0000 => false,
                    _ => return Err(DecodeError::InvalidValue),
                };
                Ok(Self::WriteSingleCoil(WriteSingleCoilRequest {
                    address,
                    value,
                }))
            }
            FunctionCode::WriteSingleRegister => {
                let address = r.read_be_u16()?;
                let value = r.read_be_u16()?;
                Ok(Self::WriteSingleRegister(WriteSingleRegisterRequest {
                    address,
                    value,
                }))
            }
            FunctionCode::WriteMultipleCoils => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_WRITE_COILS)?;
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != bits::byte_count(usize::from(quantity)) {
                    return Err(DecodeError::InvalidLength);
                }
                let values_packed = r.read_exact(byte_count)?;
                Ok(Self::WriteMultipleCoils(WriteMultipleCoilsRequestData {
                    start_address,
                    quantity,
                    values_packed,
                }))
            }
            FunctionCode::WriteMultipleRegisters => {
                let start_address = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                validate_quantity_decode(quantity, MAX_WRITE_REGISTERS)?;
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != usize::from(quantity) * 2 {
                    return Err(DecodeError::InvalidLength);
                }
                let values_bytes = r.read_exact(byte_count)?;
                Ok(Self::WriteMultipleRegisters(WriteMultipleRegistersRequestData {
                    start_address,
                    values_bytes,
                }))
            }
            FunctionCode::MaskWriteRegister => {
                let address = r.read_be_u16()?;
                let and_mask = r.read_be_u16()?;
                let or_mask = r.read_be_u16()?;
                Ok(Self::MaskWriteRegister(MaskWriteRegisterRequest {
                    address,
                    and_mask,
                    or_mask,
                }))
            }
            FunctionCode::ReadWriteMultipleRegisters => {
                let read_start_address = r.read_be_u16()?;
                let read_quantity = r.read_be_u16()?;
                validate_quantity_decode(read_quantity, MAX_READ_REGISTERS)?;
                let write_start_address = r.read_be_u16()?;
                let write_quantity = r.read_be_u16()?;
                validate_quantity_decode(write_quantity, MAX_RW_WRITE_REGISTERS)?;
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != usize::from(write_quantity) * 2 {
                    return Err(DecodeError::InvalidLength);
                }
                let values_bytes = r.read_exact(byte_count)?;
                Ok(Self::ReadWriteMultipleRegisters(
                    ReadWriteMultipleRegistersRequestData {
                        read_start_address,
                        read_quantity,
                        write_start_address,
                        values_bytes,
                    },
                ))
            }
        }
    }
}
