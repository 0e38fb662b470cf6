//! End-to-end exchanges: a master over a TCP client transport against a
//! slave serving an adopted socket.

use std::sync::Arc;
use std::time::Duration;

use ferrobus_client::{ClientError, ModbusClient};
use ferrobus_core::pdu::ExceptionCode;
use ferrobus_link::{InMemoryDevice, ModbusSlave, Timeouts, Transport};
use tokio::net::TcpListener;

async fn spawn_slave(device: Arc<InMemoryDevice>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let slave = ModbusSlave::new(Transport::adopted(socket), Arc::clone(&device))
                .with_unit_id(0x11);
            tokio::spawn(slave.run());
        }
    });

    addr
}

fn client_for(addr: std::net::SocketAddr) -> ModbusClient {
    let mut client =
        ModbusClient::new(Transport::tcp(addr.ip().to_string(), addr.port())).with_unit_id(0x11);
    // Short receive windows keep the gap-delimited reads quick in tests.
    client.set_timeouts(Timeouts::new(
        Duration::from_millis(500),
        Duration::from_millis(10),
    ));
    client
}

#[tokio::test]
async fn holding_registers_roundtrip() {
    let device = Arc::new(InMemoryDevice::new(16, 16, 0x100, 16));
    device.set_holding_register(0x6B, 0xAE41).unwrap();
    device.set_holding_register(0x6C, 0x5652).unwrap();
    device.set_holding_register(0x6D, 0x4340).unwrap();

    let addr = spawn_slave(Arc::clone(&device)).await;
    let mut client = client_for(addr);

    let values = client.read_holding_registers(0x006B, 3).await.unwrap();
    assert_eq!(values, vec![0xAE41, 0x5652, 0x4340]);

    client.write_multiple_registers(0x0010, &[1, 2, 3]).await.unwrap();
    assert_eq!(device.holding_register(0x12), Some(3));

    let read_back = client
        .read_write_multiple_registers(0x0010, 3, 0x0010, &[9, 8, 7])
        .await
        .unwrap();
    assert_eq!(read_back, vec![9, 8, 7]);
}

#[tokio::test]
async fn coils_and_discretes_roundtrip() {
    let device = Arc::new(InMemoryDevice::new(64, 64, 16, 16));
    device.set_discrete_input(5, true).unwrap();

    let addr = spawn_slave(Arc::clone(&device)).await;
    let mut client = client_for(addr);

    client.write_single_coil(3, true).await.unwrap();
    client
        .write_multiple_coils(8, &[true, false, true, true, false, false, true, false, true])
        .await
        .unwrap();

    let coils = client.read_coils(0, 20).await.unwrap();
    assert!(coils[3]);
    assert!(coils[8]);
    assert!(!coils[9]);
    assert!(coils[16]);

    let discretes = client.read_discrete_inputs(0, 8).await.unwrap();
    assert_eq!(discretes[5], true);
    assert_eq!(discretes[4], false);
}

#[tokio::test]
async fn mask_write_and_exception_paths() {
    let device = Arc::new(InMemoryDevice::new(16, 16, 16, 16));
    device.set_holding_register(4, 0x0012).unwrap();

    let addr = spawn_slave(Arc::clone(&device)).await;
    let mut client = client_for(addr);

    client.mask_write_register(4, 0x00F2, 0x0025).await.unwrap();
    assert_eq!(device.holding_register(4), Some(0x0017));

    let err = client.read_holding_registers(0x0100, 2).await.unwrap_err();
    match err {
        ClientError::Exception(ex) => {
            assert_eq!(ex.function_code, 0x03);
            assert_eq!(ex.exception_code, ExceptionCode::IllegalDataAddress);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The connection survives an exception response.
    let values = client.read_holding_registers(4, 1).await.unwrap();
    assert_eq!(values, vec![0x0017]);
}
