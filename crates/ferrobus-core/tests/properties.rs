use ferrobus_core::encoding::{bits, Reader, Writer};
use ferrobus_core::frame::rtu;
use ferrobus_core::pdu::{ReadHoldingRegistersRequest, Request, Response, WriteMultipleCoilsRequest};
use proptest::prelude::*;

proptest! {
    #[test]
    fn crc_residue_is_zero(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let crc = rtu::crc16(&data);
        let mut framed = data.clone();
        framed.extend_from_slice(&crc.to_le_bytes());
        prop_assert_eq!(rtu::crc16(&framed), 0);
    }

    #[test]
    fn rtu_frame_roundtrip(address in any::<u8>(), pdu in proptest::collection::vec(any::<u8>(), 1..=253)) {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        rtu::encode_frame(&mut w, address, &pdu).unwrap();
        prop_assert_eq!(w.as_written().len(), pdu.len() + 3);

        let (decoded_address, decoded_pdu) = rtu::decode_frame(w.as_written()).unwrap();
        prop_assert_eq!(decoded_address, address);
        prop_assert_eq!(decoded_pdu, pdu.as_slice());
    }

    #[test]
    fn request_encode_does_not_panic(start in any::<u16>(), quantity in 0u16..=130u16) {
        let req = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
            start_address: start,
            quantity,
        });
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        let _ = req.encode(&mut w);
    }

    #[test]
    fn random_response_decode_does_not_panic(data in proptest::collection::vec(any::<u8>(), 0..260)) {
        let mut r = Reader::new(&data);
        let _ = Response::decode(&mut r);
    }

    #[test]
    fn register_response_roundtrip(registers in proptest::collection::vec(any::<u16>(), 1..=125)) {
        let mut data = Vec::with_capacity(registers.len() * 2);
        for reg in &registers {
            data.extend_from_slice(&reg.to_be_bytes());
        }

        let mut pdu = Vec::with_capacity(data.len() + 2);
        pdu.push(0x03);
        pdu.push(data.len() as u8);
        pdu.extend_from_slice(&data);

        let mut r = Reader::new(&pdu);
        let decoded = Response::decode(&mut r).unwrap();

        let mut out = vec![0u8; pdu.len() + 8];
        let mut w = Writer::new(&mut out);
        decoded.encode(&mut w).unwrap();
        prop_assert_eq!(w.as_written(), pdu.as_slice());
    }

    #[test]
    fn coil_write_padding_bits_are_zero(values in proptest::collection::vec(any::<bool>(), 1..=64)) {
        let req = WriteMultipleCoilsRequest {
            start_address: 0,
            values: &values,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let written = w.as_written();
        let byte_count = usize::from(written[5]);
        prop_assert_eq!(byte_count, bits::byte_count(values.len()));

        let payload = &written[6..];
        for idx in values.len()..byte_count * 8 {
            prop_assert!(!bits::get(payload, idx));
        }
        for (idx, value) in values.iter().enumerate() {
            prop_assert_eq!(bits::get(payload, idx), *value);
        }
    }
}
