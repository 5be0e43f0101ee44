mod frame;
mod handshake;

use std::error::Error;
use std::fmt;
use std::io;
use tokio::io::AsyncRead;

pub use frame::{Frame, Opcode};
pub use handshake::accept;

/// Largest reassembled message accepted from a web client.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug)]
pub enum WsError {
    Io(io::Error),
    InvalidOpcode(u8),
    ReservedBitsSet,
    UnmaskedClientFrame,
    PayloadTooLarge(u64),
    ControlFrameTooLarge(u64),
    FragmentedControlFrame,
    UnexpectedContinuation,
    InterleavedMessage,
    InvalidUtf8,
    InvalidClosePayload,
    BadHandshake(String),
}

impl WsError {
    /// Close code sent to the peer before dropping a connection that failed
    /// with this error.
    pub fn close_code(&self) -> u16 {
        match self {
            WsError::PayloadTooLarge(_) => 1009,
            WsError::InvalidUtf8 => 1007,
            _ => 1002,
        }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WsError::Io(e) => write!(f, "websocket io error: {}", e),
            WsError::InvalidOpcode(op) => write!(f, "invalid opcode 0x{:x}", op),
            WsError::ReservedBitsSet => write!(f, "reserved bits set without an extension"),
            WsError::UnmaskedClientFrame => write!(f, "client frame is not masked"),
            WsError::PayloadTooLarge(len) => write!(f, "payload of {} bytes is too large", len),
            WsError::ControlFrameTooLarge(len) => write!(f, "control frame of {} bytes exceeds 125", len),
            WsError::FragmentedControlFrame => write!(f, "control frame is fragmented"),
            WsError::UnexpectedContinuation => write!(f, "continuation frame without a message"),
            WsError::InterleavedMessage => write!(f, "new message started before the previous one finished"),
            WsError::InvalidUtf8 => write!(f, "text message is not valid utf-8"),
            WsError::InvalidClosePayload => write!(f, "close payload of one byte"),
            WsError::BadHandshake(reason) => write!(f, "bad handshake: {}", reason),
        }
    }
}

impl Error for WsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WsError {
    fn from(e: io::Error) -> Self {
        WsError::Io(e)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<u16>, String),
}

/// Reads whole messages off a client stream, reassembling fragmented ones.
/// Control frames may arrive between fragments and are returned right away.
pub struct MessageReader<R> {
    reader: R,
    max_size: usize,
    partial: Option<(Opcode, Vec<u8>)>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R, max_size: usize) -> Self {
        MessageReader {
            reader,
            max_size,
            partial: None,
        }
    }

    pub async fn read_message(&mut self) -> Result<Message, WsError> {
        loop {
            let frame = Frame::read_from(&mut self.reader, self.max_size).await?;
            match frame.opcode {
                Opcode::Ping => return Ok(Message::Ping(frame.payload)),
                Opcode::Pong => return Ok(Message::Pong(frame.payload)),
                Opcode::Close => return parse_close(&frame.payload),
                Opcode::Text | Opcode::Binary => {
                    if self.partial.is_some() {
                        return Err(WsError::InterleavedMessage);
                    }
                    if frame.fin {
                        return to_message(frame.opcode, frame.payload);
                    }
                    self.partial = Some((frame.opcode, frame.payload));
                }
                Opcode::Continuation => {
                    let (opcode, mut payload) = self.partial
                        .take()
                        .ok_or(WsError::UnexpectedContinuation)?;
                    payload.extend(frame.payload);
                    if payload.len() > self.max_size {
                        return Err(WsError::PayloadTooLarge(payload.len() as u64));
                    }
                    if frame.fin {
                        return to_message(opcode, payload);
                    }
                    self.partial = Some((opcode, payload));
                }
            }
        }
    }
}

fn to_message(opcode: Opcode, payload: Vec<u8>) -> Result<Message, WsError> {
    match opcode {
        Opcode::Text => String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| WsError::InvalidUtf8),
        _ => Ok(Message::Binary(payload)),
    }
}

fn parse_close(payload: &[u8]) -> Result<Message, WsError> {
    match payload.len() {
        0 => Ok(Message::Close(None, String::new())),
        1 => Err(WsError::InvalidClosePayload),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            Ok(Message::Close(Some(code), String::from_utf8_lossy(&payload[2..]).into_owned()))
        }
    }
}
