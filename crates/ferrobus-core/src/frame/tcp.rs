//! TCP framing: the 7-byte MBAP header followed by the PDU.

use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError};

pub const MBAP_HEADER_LEN: usize = 7;

/// A TCP frame is at least the MBAP header plus a 1-byte PDU.
pub const MIN_FRAME_LEN: usize = MBAP_HEADER_LEN + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MbapHeader {
    pub transaction_id: u16,
    /// Always 0 for Modbus.
    pub protocol_id: u16,
    /// Counts the unit-id byte plus the PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_be_u16(self.transaction_id)?;
        w.write_be_u16(self.protocol_id)?;
        w.write_be_u16(self.length)?;
        w.write_u8(self.unit_id)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let transaction_id = r.read_be_u16()?;
        let protocol_id = r.read_be_u16()?;
        let length = r.read_be_u16()?;
        let unit_id = r.read_u8()?;

        if protocol_id != 0 {
            return Err(DecodeError::InvalidValue);
        }
        if length < 1 {
            return Err(DecodeError::InvalidLength);
        }

        Ok(Self {
            transaction_id,
            protocol_id,
            length,
            unit_id,
        })
    }
}

pub fn encode_frame(
    w: &mut Writer<'_>,
    transaction_id: u16,
    unit_id: u8,
    pdu: &[u8],
) -> Result<(), EncodeError> {
    if pdu.is_empty() {
        return Err(EncodeError::InvalidLength);
    }
    let pdu_len: u16 = pdu.len().try_into().map_err(|_| EncodeError::ValueOutOfRange)?;
    let length = pdu_len.checked_add(1).ok_or(EncodeError::ValueOutOfRange)?;

    let header = MbapHeader {
        transaction_id,
        protocol_id: 0,
        length,
        unit_id,
    };
    header.encode(w)?;
    w.write_all(pdu)?;
    Ok(())
}

/// Decodes an MBAP header and the PDU region it declares.
///
/// The reader is left positioned after the declared PDU; callers that
/// require exact framing check `is_empty` afterwards.
pub fn decode_frame<'a>(r: &mut Reader<'a>) -> Result<(MbapHeader, &'a [u8]), DecodeError> {
    let header = MbapHeader::decode(r)?;
    let pdu = r.read_exact(usize::from(header.length - 1))?;
    Ok((header, pdu))
}
