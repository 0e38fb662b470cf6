//! A Modbus TCP slave simulator backed by in-memory point banks.
//!
//! Accepted sockets are adopted into one slave engine each; all connections
//! share the same device model.

use std::sync::Arc;

use clap::Parser;
use ferrobus_link::{InMemoryDevice, ModbusSlave, Transport};
use ferrobus_tools::init_tracing;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(about = "Serve an in-memory Modbus TCP slave")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:502")]
    listen: String,
    /// Unit id this slave answers as.
    #[arg(long, default_value_t = 1)]
    unit: u8,
    /// Size of each point bank (coils, discretes, holding, input).
    #[arg(long, default_value_t = 1024)]
    points: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let device = Arc::new(InMemoryDevice::new(
        cli.points, cli.points, cli.points, cli.points,
    ));
    let listener = TcpListener::bind(&cli.listen).await?;
    info!(listen = %cli.listen, unit = cli.unit, "slave simulator ready");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "connection adopted");

        let slave = ModbusSlave::new(Transport::adopted(socket), Arc::clone(&device))
            .with_unit_id(cli.unit);
        tokio::spawn(async move {
            if let Err(err) = slave.run().await {
                warn!(%peer, error = %err, "connection ended");
            }
        });
    }
}
