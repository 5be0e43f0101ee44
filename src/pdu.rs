use crate::buffer::{convert_slice, DestinationBuffer};
use crate::cursor::Cursor;

pub const HEADER_LEN: usize = 12;
const PADDING_OFFSET: usize = 10;

pub const ENTITY_STATE: u8 = 1;
pub const FIRE: u8 = 2;
pub const DETONATION: u8 = 3;
pub const COLLISION: u8 = 4;
pub const TRANSMITTER: u8 = 25;
pub const SIGNAL: u8 = 26;

/// Entity identifier carried by an entity state PDU: site, application, entity.
pub type EntityId = (u16, u16, u16);

/// The fixed 12-byte header every DIS PDU starts with.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PduHeader {
    pub protocol_version: u8,
    pub exercise_id: u8,
    pub pdu_type: u8,
    pub protocol_family: u8,
    pub timestamp: u32,
    pub length: u16,
    pub padding: u16,
}

impl PduHeader {
    /// Returns `None` for anything that cannot be a DIS PDU: too short to
    /// hold a header, or a zero protocol version.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::from(data);
        let header = PduHeader {
            protocol_version: cursor.take()?,
            exercise_id: cursor.take()?,
            pdu_type: cursor.take()?,
            protocol_family: cursor.take()?,
            timestamp: cursor.take_u32()?,
            length: cursor.take_u16()?,
            padding: cursor.take_u16()?,
        };
        if header.protocol_version == 0 {
            return None;
        }
        Some(header)
    }

    pub fn is_entity_state(&self) -> bool {
        self.pdu_type == ENTITY_STATE
    }
}

pub fn type_name(pdu_type: u8) -> &'static str {
    match pdu_type {
        ENTITY_STATE => "EntityState",
        FIRE => "Fire",
        DETONATION => "Detonation",
        COLLISION => "Collision",
        TRANSMITTER => "Transmitter",
        SIGNAL => "Signal",
        _ => "Other",
    }
}

/// Copy of `data` with the header padding set to `padding`, or `None` if
/// `data` is not a PDU.
pub fn with_padding(data: &[u8], padding: u16) -> Option<DestinationBuffer> {
    PduHeader::parse(data)?;
    let mut copy = convert_slice(data).into_vec();
    copy[PADDING_OFFSET..HEADER_LEN].copy_from_slice(&padding.to_be_bytes());
    Some(copy.into())
}

pub fn entity_id(data: &[u8]) -> Option<EntityId> {
    let header = PduHeader::parse(data)?;
    if !header.is_entity_state() {
        return None;
    }
    let mut cursor = Cursor::from(data);
    cursor.at(HEADER_LEN);
    Some((cursor.take_u16()?, cursor.take_u16()?, cursor.take_u16()?))
}
