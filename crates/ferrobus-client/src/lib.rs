//! The Modbus master engine.
//!
//! [`ModbusClient`] owns one transport and drives the request/response cycle
//! over it: encode the request PDU, wrap it for the configured protocol,
//! send, collect the reply with the dual-timeout framing read, unwrap and
//! verify it, and hand back typed data. Exception responses surface as
//! [`ClientError::Exception`].

#![forbid(unsafe_code)]

pub mod sync;

pub use sync::SyncModbusClient;

use ferrobus_core::encoding::{bits, Reader, Writer};
use ferrobus_core::frame::{rtu, tcp};
use ferrobus_core::pdu::{
    ExceptionResponse, FunctionCode, MaskWriteRegisterRequest, ReadCoilsRequest,
    ReadDiscreteInputsRequest, ReadHoldingRegistersRequest, ReadInputRegistersRequest,
    ReadWriteMultipleRegistersRequest, Request, Response, WriteMultipleCoilsRequest,
    WriteMultipleRegistersRequest, WriteSingleCoilRequest, WriteSingleRegisterRequest,
};
use ferrobus_core::{DecodeError, EncodeError, MAX_PDU_LEN, MAX_TCP_FRAME_LEN};
use ferrobus_link::{LinkError, ProtocolKind, Timeouts, Transport};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] LinkError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("framing error: {0}")]
    Frame(#[from] DecodeError),
    #[error("no response before the response timeout")]
    Timeout,
    #[error("transaction id mismatch: expected {expected}, got {got}")]
    MismatchedTransactionId { expected: u16, got: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
    #[error("modbus exception: {0:?}")]
    Exception(ExceptionResponse),
}

/// A Modbus master bound to one transport.
///
/// An instance serialises its requests: the response read directly follows
/// the request write. Instances are not thread-safe; share one only behind
/// exclusive access.
pub struct ModbusClient {
    transport: Transport,
    unit_id: u8,
    protocol: ProtocolKind,
    next_transaction_id: u16,
}

impl ModbusClient {
    /// Binds a client to a transport, talking to unit 1 with the protocol
    /// the transport kind implies.
    pub fn new(transport: Transport) -> Self {
        let protocol = transport.default_protocol();
        Self {
            transport,
            unit_id: 1,
            protocol,
            next_transaction_id: 1,
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

    /// Selects the target unit. 0 broadcasts: the request is sent and no
    /// response is awaited (RTU only).
    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: ProtocolKind) {
        self.protocol = protocol;
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.transport.set_timeouts(timeouts);
    }

    /// Opens the transport now instead of on the first request.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.transport.open().await.map_err(ClientError::Transport)
    }

    pub fn disconnect(&mut self) {
        self.transport.close();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    fn next_tid(&mut self) -> u16 {
        let tid = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        tid
    }

    /// Runs one request/response exchange. `Ok(None)` means the request was
    /// a broadcast and no response exists.
    async fn send_request<'a>(
        &mut self,
        request: &Request<'_>,
        storage: &'a mut [u8],
    ) -> Result<Option<Response<'a>>, ClientError> {
        self.transport.open().await?;
        self.transport.flush_input().await?;

        let mut pdu_buf = [0u8; MAX_PDU_LEN];
        let mut pdu_writer = Writer::new(&mut pdu_buf);
        request.encode(&mut pdu_writer)?;
        let request_pdu = pdu_writer.as_written();

        let broadcast =
            self.protocol == ProtocolKind::Rtu && self.unit_id == rtu::BROADCAST_ADDRESS;
        let transaction_id = match self.protocol {
            ProtocolKind::Rtu => 0,
            ProtocolKind::Tcp => self.next_tid(),
        };

        let mut frame_buf = [0u8; MAX_TCP_FRAME_LEN];
        let mut frame_writer = Writer::new(&mut frame_buf);
        match self.protocol {
            ProtocolKind::Rtu => rtu::encode_frame(&mut frame_writer, self.unit_id, request_pdu)?,
            ProtocolKind::Tcp => {
                tcp::encode_frame(&mut frame_writer, transaction_id, self.unit_id, request_pdu)?
            }
        }

        debug!(
            unit_id = self.unit_id,
            function = request.function_code().as_u8(),
            pdu_len = request_pdu.len(),
            "dispatching modbus request"
        );
        self.transport.send(frame_writer.as_written()).await?;

        if broadcast {
            return Ok(None);
        }

        let received = self.transport.receive(storage).await?;
        if received == 0 {
            return Err(ClientError::Timeout);
        }

        let response_pdu = match self.protocol {
            ProtocolKind::Rtu => {
                let (address, pdu) = rtu::decode_frame(&storage[..received])?;
                if address != self.unit_id {
                    return Err(ClientError::InvalidResponse("responding unit mismatch"));
                }
                pdu
            }
            ProtocolKind::Tcp => {
                let mut reader = Reader::new(&storage[..received]);
                let (header, pdu) = tcp::decode_frame(&mut reader)?;
                if !reader.is_empty() {
                    return Err(ClientError::InvalidResponse(
                        "mbap length disagrees with frame length",
                    ));
                }
                if header.transaction_id != transaction_id {
                    return Err(ClientError::MismatchedTransactionId {
                        expected: transaction_id,
                        got: header.transaction_id,
                    });
                }
                if header.unit_id != self.unit_id {
                    return Err(ClientError::InvalidResponse("responding unit mismatch"));
                }
                pdu
            }
        };

        let mut reader = Reader::new(response_pdu);
        let response = Response::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(ClientError::InvalidResponse("trailing bytes in response"));
        }

        if let Response::Exception(ex) = response {
            return Err(ClientError::Exception(ex));
        }
        if response.function_byte() != request.function_code().as_u8() {
            return Err(ClientError::InvalidResponse("function code mismatch"));
        }

        debug!(
            unit_id = self.unit_id,
            function = response.function_byte(),
            "modbus request succeeded"
        );
        Ok(Some(response))
    }

    /// Generic bit/register read by function code, returning the raw
    /// response payload (packed bits or big-endian registers).
    pub async fn read_request(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, ClientError> {
        let request = match function {
            FunctionCode::ReadCoils => Request::ReadCoils(ReadCoilsRequest {
                start_address: address,
                quantity,
            }),
            FunctionCode::ReadDiscreteInputs => {
                Request::ReadDiscreteInputs(ReadDiscreteInputsRequest {
                    start_address: address,
                    quantity,
                })
            }
            FunctionCode::ReadHoldingRegisters => {
                Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
                    start_address: address,
                    quantity,
                })
            }
            FunctionCode::ReadInputRegisters => {
                Request::ReadInputRegisters(ReadInputRegistersRequest {
                    start_address: address,
                    quantity,
                })
            }
            _ => return Err(ClientError::Encode(EncodeError::Unsupported)),
        };

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        let payload = match response {
            Response::ReadCoils(data) => data.coil_status,
            Response::ReadDiscreteInputs(data) => data.input_status,
            Response::ReadHoldingRegisters(data) => data.data,
            Response::ReadInputRegisters(data) => data.data,
            _ => return Err(ClientError::InvalidResponse("unexpected function response")),
        };
        Ok(payload.to_vec())
    }

    /// Generic write by function code. `data` carries the raw payload: a
    /// big-endian value for the single writes, packed bits or big-endian
    /// registers for the multiple writes. Returns the count written (1 for
    /// the single writes).
    pub async fn write_request(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> Result<u16, ClientError> {
        match function {
            FunctionCode::WriteSingleCoil => {
                if data.len() != 2 {
                    return Err(ClientError::Encode(EncodeError::InvalidLength));
                }
                let value = match u16::from_be_bytes([data[0], data[1]]) {
                    0xFF00 => true,
                    0x0000 => false,
                    _ => return Err(ClientError::Encode(EncodeError::ValueOutOfRange)),
                };
                self.write_single_coil(address, value).await?;
                Ok(1)
            }
            FunctionCode::WriteSingleRegister => {
                if data.len() != 2 {
                    return Err(ClientError::Encode(EncodeError::InvalidLength));
                }
                self.write_single_register(address, u16::from_be_bytes([data[0], data[1]]))
                    .await?;
                Ok(1)
            }
            FunctionCode::WriteMultipleCoils => {
                if data.len() != bits::byte_count(usize::from(quantity)) {
                    return Err(ClientError::Encode(EncodeError::InvalidLength));
                }
                let values: Vec<bool> =
                    (0..usize::from(quantity)).map(|i| bits::get(data, i)).collect();
                self.write_multiple_coils(address, &values).await?;
                Ok(quantity)
            }
            FunctionCode::WriteMultipleRegisters => {
                if data.len() != usize::from(quantity) * 2 {
                    return Err(ClientError::Encode(EncodeError::InvalidLength));
                }
                let values: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                self.write_multiple_registers(address, &values).await?;
                Ok(quantity)
            }
            _ => Err(ClientError::Encode(EncodeError::Unsupported)),
        }
    }

    pub async fn read_coils(&mut self, start: u16, quantity: u16) -> Result<Vec<bool>, ClientError> {
        let request = Request::ReadCoils(ReadCoilsRequest {
            start_address: start,
            quantity,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        match response {
            Response::ReadCoils(data) => {
                if data.coil_status.len() != bits::byte_count(usize::from(quantity)) {
                    return Err(ClientError::InvalidResponse("coil payload length mismatch"));
                }
                Ok((0..usize::from(quantity)).map(|i| bits::get(data.coil_status, i)).collect())
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn read_discrete_inputs(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        let request = Request::ReadDiscreteInputs(ReadDiscreteInputsRequest {
            start_address: start,
            quantity,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        match response {
            Response::ReadDiscreteInputs(data) => {
                if data.input_status.len() != bits::byte_count(usize::from(quantity)) {
                    return Err(ClientError::InvalidResponse(
                        "discrete input payload length mismatch",
                    ));
                }
                Ok((0..usize::from(quantity)).map(|i| bits::get(data.input_status, i)).collect())
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn read_holding_registers(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let request = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
            start_address: start,
            quantity,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        match response {
            Response::ReadHoldingRegisters(data) => {
                if data.register_count() != usize::from(quantity) {
                    return Err(ClientError::InvalidResponse("register payload length mismatch"));
                }
                Ok((0..usize::from(quantity)).filter_map(|i| data.register(i)).collect())
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn read_input_registers(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let request = Request::ReadInputRegisters(ReadInputRegistersRequest {
            start_address: start,
            quantity,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        match response {
            Response::ReadInputRegisters(data) => {
                if data.register_count() != usize::from(quantity) {
                    return Err(ClientError::InvalidResponse("register payload length mismatch"));
                }
                Ok((0..usize::from(quantity)).filter_map(|i| data.register(i)).collect())
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), ClientError> {
        let request = Request::WriteSingleCoil(WriteSingleCoilRequest { address, value });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(());
        };

        match response {
            Response::WriteSingleCoil(resp) if resp.address == address && resp.value == value => {
                Ok(())
            }
            Response::WriteSingleCoil(_) => {
                Err(ClientError::InvalidResponse("write single coil echo mismatch"))
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), ClientError> {
        let request = Request::WriteSingleRegister(WriteSingleRegisterRequest { address, value });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(());
        };

        match response {
            Response::WriteSingleRegister(resp)
                if resp.address == address && resp.value == value =>
            {
                Ok(())
            }
            Response::WriteSingleRegister(_) => {
                Err(ClientError::InvalidResponse("write single register echo mismatch"))
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn write_multiple_coils(
        &mut self,
        start: u16,
        values: &[bool],
    ) -> Result<(), ClientError> {
        let request_variant = WriteMultipleCoilsRequest {
            start_address: start,
            values,
        };
        let expected_quantity = request_variant.quantity()?;

        let request = Request::WriteMultipleCoils(request_variant);
        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(());
        };

        match response {
            Response::WriteMultipleCoils(resp)
                if resp.start_address == start && resp.quantity == expected_quantity =>
            {
                Ok(())
            }
            Response::WriteMultipleCoils(_) => {
                Err(ClientError::InvalidResponse("write multiple coils echo mismatch"))
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<(), ClientError> {
        let request_variant = WriteMultipleRegistersRequest {
            start_address: start,
            values,
        };
        let expected_quantity = request_variant.quantity()?;

        let request = Request::WriteMultipleRegisters(request_variant);
        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(());
        };

        match response {
            Response::WriteMultipleRegisters(resp)
                if resp.start_address == start && resp.quantity == expected_quantity =>
            {
                Ok(())
            }
            Response::WriteMultipleRegisters(_) => Err(ClientError::InvalidResponse(
                "write multiple registers echo mismatch",
            )),
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<(), ClientError> {
        let request = Request::MaskWriteRegister(MaskWriteRegisterRequest {
            address,
            and_mask,
            or_mask,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(());
        };

        match response {
            Response::MaskWriteRegister(resp)
                if resp.address == address
                    && resp.and_mask == and_mask
                    && resp.or_mask == or_mask =>
            {
                Ok(())
            }
            Response::MaskWriteRegister(_) => {
                Err(ClientError::InvalidResponse("mask write register echo mismatch"))
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }

    pub async fn read_write_multiple_registers(
        &mut self,
        read_start: u16,
        read_quantity: u16,
        write_start: u16,
        write_values: &[u16],
    ) -> Result<Vec<u16>, ClientError> {
        let request = Request::ReadWriteMultipleRegisters(ReadWriteMultipleRegistersRequest {
            read_start_address: read_start,
            read_quantity,
            write_start_address: write_start,
            values: write_values,
        });

        let mut storage = [0u8; MAX_TCP_FRAME_LEN];
        let Some(response) = self.send_request(&request, &mut storage).await? else {
            return Ok(Vec::new());
        };

        match response {
            Response::ReadWriteMultipleRegisters(data) => {
                if data.register_count() != usize::from(read_quantity) {
                    return Err(ClientError::InvalidResponse("register payload length mismatch"));
                }
                Ok((0..usize::from(read_quantity)).filter_map(|i| data.register(i)).collect())
            }
            _ => Err(ClientError::InvalidResponse("unexpected function response")),
        }
    }
}
