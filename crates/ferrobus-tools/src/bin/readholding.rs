//! Read holding registers from a Modbus TCP server.

use clap::Parser;
use ferrobus_tools::{init_tracing, ConnectionArgs};

#[derive(Debug, Parser)]
#[command(about = "Read holding registers (FC03)")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    /// First register address.
    #[arg(long, default_value_t = 0)]
    address: u16,
    /// Number of registers to read.
    #[arg(long, default_value_t = 1)]
    quantity: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut client = cli.connection.build_client();
    let values = client.read_holding_registers(cli.address, cli.quantity).await?;

    for (offset, value) in values.iter().enumerate() {
        let address = cli.address + offset as u16;
        println!("{address:#06X}: {value:#06X} ({value})");
    }
    Ok(())
}
