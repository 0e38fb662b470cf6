//! Golden byte patterns from the published Modbus protocol examples.

use ferrobus_core::encoding::{Reader, Writer};
use ferrobus_core::frame;
use ferrobus_core::pdu::{
    ExceptionCode, ReadHoldingRegistersRequest, Request, Response, WriteSingleCoilRequest,
};
use ferrobus_core::{DecodeError, EncodeError};

const READ_HOLDING_REQ_PDU: &[u8] = &[0x03, 0x00, 0x6B, 0x00, 0x03];
const READ_HOLDING_RTU_REQ: &[u8] = &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87];
const READ_HOLDING_RTU_RESP: &[u8] = &[
    0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD,
];
const EXCEPTION_RTU_RESP: &[u8] = &[0x11, 0x83, 0x02, 0xC1, 0x34];
const WRITE_COIL_RTU_REQ: &[u8] = &[0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00, 0x4E, 0x8B];
const READ_HOLDING_TCP_REQ: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03,
];
const READ_HOLDING_TCP_RESP: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40,
];

#[test]
fn fc03_request_golden_encode() {
    let request = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
        start_address: 0x006B,
        quantity: 0x0003,
    });

    let mut buf = [0u8; 16];
    let mut w = Writer::new(&mut buf);
    request.encode(&mut w).unwrap();
    assert_eq!(w.as_written(), READ_HOLDING_REQ_PDU);
}

#[test]
fn fc03_rtu_request_golden_frame() {
    let mut buf = [0u8; 16];
    let mut w = Writer::new(&mut buf);
    frame::rtu::encode_frame(&mut w, 0x11, READ_HOLDING_REQ_PDU).unwrap();
    assert_eq!(w.as_written(), READ_HOLDING_RTU_REQ);
}

#[test]
fn fc03_rtu_response_golden_decode() {
    let (address, pdu) = frame::rtu::decode_frame(READ_HOLDING_RTU_RESP).unwrap();
    assert_eq!(address, 0x11);
    assert_eq!(pdu.len() + 3, READ_HOLDING_RTU_RESP.len());

    let mut r = Reader::new(pdu);
    match Response::decode(&mut r).unwrap() {
        Response::ReadHoldingRegisters(resp) => {
            assert_eq!(resp.register_count(), 3);
            assert_eq!(resp.register(0), Some(0xAE41));
            assert_eq!(resp.register(1), Some(0x5652));
            assert_eq!(resp.register(2), Some(0x4340));
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert!(r.is_empty());
}

#[test]
fn exception_rtu_response_golden_decode() {
    let (address, pdu) = frame::rtu::decode_frame(EXCEPTION_RTU_RESP).unwrap();
    assert_eq!(address, 0x11);

    let mut r = Reader::new(pdu);
    match Response::decode(&mut r).unwrap() {
        Response::Exception(ex) => {
            assert_eq!(ex.function_code, 0x03);
            assert_eq!(ex.exception_code, ExceptionCode::IllegalDataAddress);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn fc05_rtu_request_golden_frame() {
    let request = Request::WriteSingleCoil(WriteSingleCoilRequest {
        address: 0x00AC,
        value: true,
    });

    let mut pdu = [0u8; 8];
    let mut w = Writer::new(&mut pdu);
    request.encode(&mut w).unwrap();

    let mut buf = [0u8; 16];
    let mut fw = Writer::new(&mut buf);
    frame::rtu::encode_frame(&mut fw, 0x11, w.as_written()).unwrap();
    assert_eq!(fw.as_written(), WRITE_COIL_RTU_REQ);
}

#[test]
fn corrupted_crc_is_a_framing_error() {
    let mut tampered = READ_HOLDING_RTU_RESP.to_vec();
    tampered[9] = 0x00;
    tampered[10] = 0x00;
    assert_eq!(
        frame::rtu::decode_frame(&tampered).unwrap_err(),
        DecodeError::InvalidCrc
    );
}

#[test]
fn fc03_tcp_golden_frames() {
    let mut buf = [0u8; 32];
    let mut w = Writer::new(&mut buf);
    frame::tcp::encode_frame(&mut w, 0x0001, 0x11, READ_HOLDING_REQ_PDU).unwrap();
    assert_eq!(w.as_written(), READ_HOLDING_TCP_REQ);

    let mut r = Reader::new(READ_HOLDING_TCP_RESP);
    let (header, pdu) = frame::tcp::decode_frame(&mut r).unwrap();
    assert_eq!(header.transaction_id, 0x0001);
    assert_eq!(header.protocol_id, 0);
    assert_eq!(header.length, 0x0009);
    assert_eq!(header.unit_id, 0x11);
    assert_eq!(usize::from(header.length), 1 + pdu.len());
    assert!(r.is_empty());

    let mut pr = Reader::new(pdu);
    match Response::decode(&mut pr).unwrap() {
        Response::ReadHoldingRegisters(resp) => assert_eq!(resp.register(0), Some(0xAE41)),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn quantity_boundaries_are_validated() {
    let mut buf = [0u8; 16];

    let mut w = Writer::new(&mut buf);
    let req = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
        start_address: 0,
        quantity: 0,
    });
    assert_eq!(req.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);

    let mut w = Writer::new(&mut buf);
    let req = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
        start_address: 0,
        quantity: 126,
    });
    assert_eq!(req.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);
}

#[test]
fn exception_roundtrip() {
    let bytes = [0x83u8, 0x02];
    let mut r = Reader::new(&bytes);
    let decoded = Response::decode(&mut r).unwrap();

    let mut out = [0u8; 8];
    let mut w = Writer::new(&mut out);
    decoded.encode(&mut w).unwrap();
    assert_eq!(w.as_written(), &bytes);
}
