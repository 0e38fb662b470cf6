//! Shared plumbing for the command-line tools.

use clap::Args;
use ferrobus_client::ModbusClient;
use ferrobus_link::{Timeouts, Transport};
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Server host for Modbus TCP.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port for Modbus TCP.
    #[arg(long, default_value_t = 502)]
    pub port: u16,
    /// Target unit id (0 broadcasts on RTU).
    #[arg(long, default_value_t = 1)]
    pub unit: u8,
    /// Response timeout in milliseconds.
    #[arg(long, default_value_t = 300)]
    pub response_timeout: u64,
    /// Inter-byte timeout in milliseconds.
    #[arg(long, default_value_t = 32)]
    pub inter_byte_timeout: u64,
}

impl ConnectionArgs {
    pub fn build_client(&self) -> ModbusClient {
        let mut client =
            ModbusClient::new(Transport::tcp(self.host.clone(), self.port)).with_unit_id(self.unit);
        client.set_timeouts(Timeouts::new(
            Duration::from_millis(self.response_timeout),
            Duration::from_millis(self.inter_byte_timeout),
        ));
        client
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(format!("invalid bool value: {input}")),
    }
}
