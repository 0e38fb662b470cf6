//! Write a single coil on a Modbus TCP server.

use clap::Parser;
use ferrobus_tools::{init_tracing, parse_bool, ConnectionArgs};

#[derive(Debug, Parser)]
#[command(about = "Write a single coil (FC05)")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    /// Coil address.
    #[arg(long)]
    address: u16,
    /// Coil state: on/off, true/false, 1/0.
    #[arg(long, value_parser = parse_bool)]
    value: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut client = cli.connection.build_client();
    client.write_single_coil(cli.address, cli.value).await?;

    println!(
        "coil {:#06X} set {}",
        cli.address,
        if cli.value { "on" } else { "off" }
    );
    Ok(())
}
