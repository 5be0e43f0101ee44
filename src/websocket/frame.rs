use tokio::io::{AsyncRead, AsyncReadExt};
use crate::websocket::WsError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, WsError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(WsError::InvalidOpcode(other)),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn text(message: &str) -> Self {
        Frame { fin: true, opcode: Opcode::Text, payload: message.as_bytes().to_vec() }
    }

    pub fn binary(data: &[u8]) -> Self {
        Frame { fin: true, opcode: Opcode::Binary, payload: data.to_vec() }
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Frame { fin: true, opcode: Opcode::Pong, payload }
    }

    pub fn close(code: Option<u16>) -> Self {
        let payload = code.map(|c| c.to_be_bytes().to_vec()).unwrap_or_default();
        Frame { fin: true, opcode: Opcode::Close, payload }
    }

    /// Server-side encoding, so the payload is never masked.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut vec = Vec::with_capacity(len + 10);
        let fin = if self.fin { 0x80 } else { 0 };
        vec.push(fin | self.opcode.to_u8());
        if len < 126 {
            vec.push(len as u8);
        } else if len <= u16::MAX as usize {
            vec.push(126);
            vec.extend(&(len as u16).to_be_bytes());
        } else {
            vec.push(127);
            vec.extend(&(len as u64).to_be_bytes());
        }
        vec.extend(&self.payload);
        vec
    }

    /// Reads one masked client frame.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R, max_payload: usize) -> Result<Frame, WsError> {
        let first = reader.read_u8().await?;
        let second = reader.read_u8().await?;
        if first & 0x70 != 0 {
            return Err(WsError::ReservedBitsSet);
        }
        let fin = first & 0x80 != 0;
        let opcode = Opcode::from_u8(first & 0x0F)?;
        if second & 0x80 == 0 {
            return Err(WsError::UnmaskedClientFrame);
        }
        let len = match second & 0x7F {
            126 => reader.read_u16().await? as u64,
            127 => reader.read_u64().await?,
            n => n as u64,
        };
        if opcode.is_control() {
            if !fin {
                return Err(WsError::FragmentedControlFrame);
            }
            if len > 125 {
                return Err(WsError::ControlFrameTooLarge(len));
            }
        }
        if len > max_payload as u64 {
            return Err(WsError::PayloadTooLarge(len));
        }
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;
        apply_mask(&mut payload, key);
        Ok(Frame { fin, opcode, payload })
    }
}

pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
