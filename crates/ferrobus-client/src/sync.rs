//! Blocking facade over [`ModbusClient`] for hosts without an async runtime.
//!
//! Calls block the current thread for at most the response timeout plus the
//! inter-byte timeout per frame, matching the cooperative single-threaded
//! model the engine is designed around.

use crate::{ClientError, ModbusClient};
use ferrobus_core::pdu::FunctionCode;
use ferrobus_link::{Timeouts, Transport};
use thiserror::Error;
use tokio::runtime::Runtime;

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("runtime init error: {0}")]
    RuntimeInit(std::io::Error),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

pub struct SyncModbusClient {
    runtime: Runtime,
    client: ModbusClient,
}

impl SyncModbusClient {
    pub fn new(transport: Transport) -> Result<Self, SyncClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SyncClientError::RuntimeInit)?;
        Ok(Self {
            runtime,
            client: ModbusClient::new(transport),
        })
    }

    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.client.set_unit_id(unit_id);
    }

    pub fn set_protocol(&mut self, protocol: ferrobus_link::ProtocolKind) {
        self.client.set_protocol(protocol);
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.client.set_timeouts(timeouts);
    }

    pub fn connect(&mut self) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime.block_on(client.connect()).map_err(SyncClientError::from)
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn read_request(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_request(function, address, quantity))
            .map_err(SyncClientError::from)
    }

    pub fn write_request(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> Result<u16, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.write_request(function, address, quantity, data))
            .map_err(SyncClientError::from)
    }

    pub fn read_coils(&mut self, start: u16, quantity: u16) -> Result<Vec<bool>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_coils(start, quantity))
            .map_err(SyncClientError::from)
    }

    pub fn read_discrete_inputs(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_discrete_inputs(start, quantity))
            .map_err(SyncClientError::from)
    }

    pub fn read_holding_registers(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_holding_registers(start, quantity))
            .map_err(SyncClientError::from)
    }

    pub fn read_input_registers(
        &mut self,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_input_registers(start, quantity))
            .map_err(SyncClientError::from)
    }

    pub fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.write_single_coil(address, value))
            .map_err(SyncClientError::from)
    }

    pub fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.write_single_register(address, value))
            .map_err(SyncClientError::from)
    }

    pub fn write_multiple_coils(
        &mut self,
        start: u16,
        values: &[bool],
    ) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.write_multiple_coils(start, values))
            .map_err(SyncClientError::from)
    }

    pub fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.write_multiple_registers(start, values))
            .map_err(SyncClientError::from)
    }

    pub fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<(), SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.mask_write_register(address, and_mask, or_mask))
            .map_err(SyncClientError::from)
    }

    pub fn read_write_multiple_registers(
        &mut self,
        read_start: u16,
        read_quantity: u16,
        write_start: u16,
        write_values: &[u16],
    ) -> Result<Vec<u16>, SyncClientError> {
        let client = &mut self.client;
        self.runtime
            .block_on(client.read_write_multiple_registers(
                read_start,
                read_quantity,
                write_start,
                write_values,
            ))
            .map_err(SyncClientError::from)
    }
}
