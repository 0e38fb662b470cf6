//! The slave engine: receive, filter, dispatch to the device callbacks,
//! respond.

use std::sync::Arc;

use ferrobus_core::encoding::{bits, Reader, Writer};
use ferrobus_core::frame::{rtu, tcp};
use ferrobus_core::pdu::{DecodedRequest, ExceptionCode, FunctionCode};
use ferrobus_core::{DecodeError, EncodeError, MAX_PDU_LEN, MAX_TCP_FRAME_LEN};
use tracing::debug;

use crate::{LinkError, ProtocolKind, Transport};

/// Failure a device callback reports for one addressed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointError {
    IllegalAddress,
    IllegalValue,
    DeviceFailure,
}

impl PointError {
    pub const fn exception_code(self) -> ExceptionCode {
        match self {
            Self::IllegalAddress => ExceptionCode::IllegalDataAddress,
            Self::IllegalValue => ExceptionCode::IllegalDataValue,
            Self::DeviceFailure => ExceptionCode::ServerDeviceFailure,
        }
    }
}

/// The application's register and coil backing store, one point at a time.
///
/// The engine calls these once per addressed point, aborting the scan at the
/// first error; partial success is never reported to the master. Methods take
/// `&self` so a single service value can back several engines; mutable state
/// lives behind interior mutability.
pub trait DeviceService: Send + Sync {
    fn read_discrete(&self, address: u16) -> Result<bool, PointError>;
    fn read_coil(&self, address: u16) -> Result<bool, PointError>;
    fn write_coil(&self, address: u16, value: bool) -> Result<(), PointError>;
    fn read_input(&self, address: u16) -> Result<u16, PointError>;
    fn read_holding(&self, address: u16) -> Result<u16, PointError>;
    fn write_holding(&self, address: u16, value: u16) -> Result<(), PointError>;
}

impl<S> DeviceService for Arc<S>
where
    S: DeviceService + ?Sized,
{
    fn read_discrete(&self, address: u16) -> Result<bool, PointError> {
        (**self).read_discrete(address)
    }

    fn read_coil(&self, address: u16) -> Result<bool, PointError> {
        (**self).read_coil(address)
    }

    fn write_coil(&self, address: u16, value: bool) -> Result<(), PointError> {
        (**self).write_coil(address, value)
    }

    fn read_input(&self, address: u16) -> Result<u16, PointError> {
        (**self).read_input(address)
    }

    fn read_holding(&self, address: u16) -> Result<u16, PointError> {
        (**self).read_holding(address)
    }

    fn write_holding(&self, address: u16, value: u16) -> Result<(), PointError> {
        (**self).write_holding(address, value)
    }
}

/// What one [`ModbusSlave::tick`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No frame arrived within the response timeout.
    Idle,
    /// A request was dispatched (and answered, unless it was a broadcast).
    Served,
    /// A frame arrived but was dropped: bad CRC, wrong address, bad header.
    Ignored,
}

/// A single-connection Modbus slave.
///
/// The host drives it by calling [`tick`](Self::tick) in a loop (or via
/// [`run`](Self::run)); each tick handles at most one request.
pub struct ModbusSlave<S> {
    transport: Transport,
    service: S,
    unit_id: u8,
    protocol: ProtocolKind,
}

impl<S: DeviceService> ModbusSlave<S> {
    pub fn new(transport: Transport, service: S) -> Self {
        let protocol = transport.default_protocol();
        Self {
            transport,
            service,
            unit_id: 1,
            protocol,
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// One receive / filter / dispatch / respond iteration.
    ///
    /// Transport failures close the channel and are returned; everything
    /// else is absorbed (bad frames are dropped, bad requests answered with
    /// exception responses).
    pub async fn tick(&mut self) -> Result<Tick, LinkError> {
        self.transport.open().await?;

        let mut frame = [0u8; MAX_TCP_FRAME_LEN];
        let received = self.transport.receive(&mut frame).await?;
        if received == 0 {
            return Ok(Tick::Idle);
        }

        match self.protocol {
            ProtocolKind::Rtu => self.serve_rtu(&frame[..received]).await,
            ProtocolKind::Tcp => self.serve_tcp(&frame[..received]).await,
        }
    }

    /// Serves requests until the transport fails or the peer disconnects.
    pub async fn run(mut self) -> Result<(), LinkError> {
        loop {
            self.tick().await?;
        }
    }

    async fn serve_rtu(&mut self, raw: &[u8]) -> Result<Tick, LinkError> {
        let Ok((address, request_pdu)) = rtu::decode_frame(raw) else {
            return Ok(Tick::Ignored);
        };

        #[cfg(feature = "strict-unit-check")]
        if address != self.unit_id && address != rtu::BROADCAST_ADDRESS {
            return Ok(Tick::Ignored);
        }

        let mut pdu = [0u8; MAX_PDU_LEN];
        let response_len = execute(&self.service, request_pdu, &mut pdu);

        // A broadcast addresses every slave at once; nobody answers it.
        if address == rtu::BROADCAST_ADDRESS {
            return Ok(Tick::Served);
        }

        debug!(
            unit_id = address,
            function = request_pdu.first().copied().unwrap_or(0),
            response_len,
            "served modbus rtu request"
        );

        let mut frame = [0u8; ferrobus_core::MAX_RTU_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        rtu::encode_frame(&mut w, address, &pdu[..response_len])?;
        self.transport.send(w.as_written()).await?;
        Ok(Tick::Served)
    }

    async fn serve_tcp(&mut self, raw: &[u8]) -> Result<Tick, LinkError> {
        let mut reader = Reader::new(raw);
        let Ok((header, request_pdu)) = tcp::decode_frame(&mut reader) else {
            return Ok(Tick::Ignored);
        };
        if !reader.is_empty() {
            return Ok(Tick::Ignored);
        }

        #[cfg(feature = "strict-mbap-check")]
        if header.unit_id != self.unit_id {
            return Ok(Tick::Ignored);
        }

        let mut pdu = [0u8; MAX_PDU_LEN];
        let response_len = execute(&self.service, request_pdu, &mut pdu);

        debug!(
            transaction_id = header.transaction_id,
            unit_id = header.unit_id,
            function = request_pdu.first().copied().unwrap_or(0),
            response_len,
            "served modbus tcp request"
        );

        let mut frame = [0u8; MAX_TCP_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        tcp::encode_frame(
            &mut w,
            header.transaction_id,
            header.unit_id,
            &pdu[..response_len],
        )?;
        self.transport.send(w.as_written()).await?;
        Ok(Tick::Served)
    }
}

/// Decodes a request PDU, runs it against the service and writes the
/// response PDU (normal or exception) into `out`, returning its length.
fn execute<S: DeviceService>(service: &S, request_pdu: &[u8], out: &mut [u8]) -> usize {
    let mut reader = Reader::new(request_pdu);
    let result = match DecodedRequest::decode(&mut reader) {
        Ok(request) if reader.is_empty() => run_request(service, &request, out),
        Ok(_) => Err(ExceptionCode::IllegalDataValue),
        Err(err) => Err(map_decode_error(err)),
    };

    match result {
        Ok(len) => len,
        Err(code) => {
            let function = request_pdu.first().copied().unwrap_or(0) & 0x7F;
            out[0] = function | 0x80;
            out[1] = code.as_u8();
            2
        }
    }
}

/// Quantity limits, byte counts and coil values are checked while decoding;
/// all of those violations answer with illegal-data-value before any
/// callback runs. An unknown function code answers illegal-function.
fn map_decode_error(err: DecodeError) -> ExceptionCode {
    match err {
        DecodeError::InvalidFunctionCode => ExceptionCode::IllegalFunction,
        DecodeError::InvalidLength | DecodeError::InvalidValue | DecodeError::UnexpectedEof => {
            ExceptionCode::IllegalDataValue
        }
        DecodeError::InvalidCrc => ExceptionCode::ServerDeviceFailure,
    }
}

fn map_encode(_err: EncodeError) -> ExceptionCode {
    ExceptionCode::ServerDeviceFailure
}

fn point_error(err: PointError) -> ExceptionCode {
    err.exception_code()
}

/// Addresses `start .. start + quantity` as an inclusive iterator, rejecting
/// scans that run past the 16-bit address space.
fn address_span(
    start: u16,
    quantity: u16,
) -> Result<core::ops::RangeInclusive<u16>, ExceptionCode> {
    let last = start
        .checked_add(quantity - 1)
        .ok_or(ExceptionCode::IllegalDataAddress)?;
    Ok(start..=last)
}

fn run_request<S: DeviceService>(
    service: &S,
    request: &DecodedRequest<'_>,
    out: &mut [u8],
) -> Result<usize, ExceptionCode> {
    let mut w = Writer::new(out);

    match request {
        DecodedRequest::ReadCoils(req) => {
            let mut packed = [0u8; 250];
            for (i, address) in address_span(req.start_address, req.quantity)?.enumerate() {
                let value = service.read_coil(address).map_err(point_error)?;
                bits::set(&mut packed, i, value);
            }
            let byte_count = bits::byte_count(usize::from(req.quantity));
            w.write_u8(FunctionCode::ReadCoils.as_u8()).map_err(map_encode)?;
            w.write_u8(byte_count as u8).map_err(map_encode)?;
            w.write_all(&packed[..byte_count]).map_err(map_encode)?;
        }
        DecodedRequest::ReadDiscreteInputs(req) => {
            let mut packed = [0u8; 250];
            for (i, address) in address_span(req.start_address, req.quantity)?.enumerate() {
                let value = service.read_discrete(address).map_err(point_error)?;
                bits::set(&mut packed, i, value);
            }
            let byte_count = bits::byte_count(usize::from(req.quantity));
            w.write_u8(FunctionCode::ReadDiscreteInputs.as_u8())
                .map_err(map_encode)?;
            w.write_u8(byte_count as u8).map_err(map_encode)?;
            w.write_all(&packed[..byte_count]).map_err(map_encode)?;
        }
        DecodedRequest::ReadHoldingRegisters(req) => {
            w.write_u8(FunctionCode::ReadHoldingRegisters.as_u8())
                .map_err(map_encode)?;
            w.write_u8((req.quantity * 2) as u8).map_err(map_encode)?;
            for address in address_span(req.start_address, req.quantity)? {
                let value = service.read_holding(address).map_err(point_error)?;
                w.write_be_u16(value).map_err(map_encode)?;
            }
        }
        DecodedRequest::ReadInputRegisters(req) => {
            w.write_u8(FunctionCode::ReadInputRegisters.as_u8())
                .map_err(map_encode)?;
            w.write_u8((req.quantity * 2) as u8).map_err(map_encode)?;
            for address in address_span(req.start_address, req.quantity)? {
                let value = service.read_input(address).map_err(point_error)?;
                w.write_be_u16(value).map_err(map_encode)?;
            }
        }
        DecodedRequest::WriteSingleCoil(req) => {
            service.write_coil(req.address, req.value).map_err(point_error)?;
            w.write_u8(FunctionCode::WriteSingleCoil.as_u8())
                .map_err(map_encode)?;
            w.write_be_u16(req.address).map_err(map_encode)?;
            w.write_be_u16(if req.value { 0xFF00 } else { 0x0000 })
                .map_err(map_encode)?;
        }
        DecodedRequest::WriteSingleRegister(req) => {
            service
                .write_holding(req.address, req.value)
                .map_err(point_error)?;
            w.write_u8(FunctionCode::WriteSingleRegister.as_u8())
                .map_err(map_encode)?;
            w.write_be_u16(req.address).map_err(map_encode)?;
            w.write_be_u16(req.value).map_err(map_encode)?;
        }
        DecodedRequest::WriteMultipleCoils(req) => {
            for (i, address) in address_span(req.start_address, req.quantity)?.enumerate() {
                let value = req.coil(i).ok_or(ExceptionCode::IllegalDataValue)?;
                service.write_coil(address, value).map_err(point_error)?;
            }
            w.write_u8(FunctionCode::WriteMultipleCoils.as_u8())
                .map_err(map_encode)?;
            w.write_be_u16(req.start_address).map_err(map_encode)?;
            w.write_be_u16(req.quantity).map_err(map_encode)?;
        }
        DecodedRequest::WriteMultipleRegisters(req) => {
            let quantity = req.quantity() as u16;
            for (i, address) in address_span(req.start_address, quantity)?.enumerate() {
                let value = req.register(i).ok_or(ExceptionCode::IllegalDataValue)?;
                service.write_holding(address, value).map_err(point_error)?;
            }
            w.write_u8(FunctionCode::WriteMultipleRegisters.as_u8())
                .map_err(map_encode)?;
            w.write_be_u16(req.start_address).map_err(map_encode)?;
            w.write_be_u16(quantity).map_err(map_encode)?;
        }
        DecodedRequest::MaskWriteRegister(req) => {
            // Realised as read-modify-write through the holding callbacks.
            let current = service.read_holding(req.address).map_err(point_error)?;
            let next = (current & req.and_mask) | (req.or_mask & !req.and_mask);
            service
                .write_holding(req.address, next)
                .map_err(point_error)?;
            w.write_u8(FunctionCode::MaskWriteRegister.as_u8())
                .map_err(map_encode)?;
            w.write_be_u16(req.address).map_err(map_encode)?;
            w.write_be_u16(req.and_mask).map_err(map_encode)?;
            w.write_be_u16(req.or_mask).map_err(map_encode)?;
        }
        DecodedRequest::ReadWriteMultipleRegisters(req) => {
            // Writes are performed before any read.
            let write_quantity = req.write_quantity() as u16;
            for (i, address) in address_span(req.write_start_address, write_quantity)?.enumerate() {
                let value = req.register(i).ok_or(ExceptionCode::IllegalDataValue)?;
                service.write_holding(address, value).map_err(point_error)?;
            }

            w.write_u8(FunctionCode::ReadWriteMultipleRegisters.as_u8())
                .map_err(map_encode)?;
            w.write_u8((req.read_quantity * 2) as u8).map_err(map_encode)?;
            for address in address_span(req.read_start_address, req.read_quantity)? {
                let value = service.read_holding(address).map_err(point_error)?;
                w.write_be_u16(value).map_err(map_encode)?;
            }
        }
    }

    Ok(w.position())
}
