use crate::pdu::PduHeader;

/// Area of interest management: decides whether a PDU is forwarded to one
/// web connection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AreaOfInterest {
    PassAll,
    PduTypes(Vec<u8>),
}

impl AreaOfInterest {
    pub fn from(enable: bool, pdu_types: &[u8]) -> Self {
        if enable {
            AreaOfInterest::PduTypes(pdu_types.to_vec())
        } else {
            AreaOfInterest::PassAll
        }
    }

    pub fn passes(&self, data: &[u8]) -> bool {
        match self {
            AreaOfInterest::PassAll => true,
            AreaOfInterest::PduTypes(types) => {
                match PduHeader::parse(data) {
                    Some(header) => types.contains(&header.pdu_type),
                    None => false,
                }
            }
        }
    }
}
