use std::ops::Deref;
use crate::error::InvalidInput;

/// Largest datagram read off the native network. Bundled PDUs can exceed
/// the ethernet MTU, so this is well above a single PDU.
pub const MAX_PACKET_SIZE: usize = 8 * 1024;

/// An integer that is copied into a binary buffer as one byte.
///
/// Values outside `0..=255` keep their low-order eight bits, so `-1i8`
/// becomes `255` and `256i32` becomes `0`.
pub trait ByteValue: Copy {
    fn to_byte(self) -> u8;
}

macro_rules! impl_byte_value {
    ($($t:ty),*) => {
        $(
            impl ByteValue for $t {
                #[inline]
                fn to_byte(self) -> u8 {
                    self as u8
                }
            }
        )*
    };
}

impl_byte_value!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

/// Fixed-length owned binary buffer produced by [`convert`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DestinationBuffer(Box<[u8]>);

impl DestinationBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl Deref for DestinationBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DestinationBuffer {
    fn from(vec: Vec<u8>) -> Self {
        DestinationBuffer(vec.into_boxed_slice())
    }
}

/// Copies `source` element by element into a newly allocated buffer of the
/// same length. `None` is the only rejected input.
pub fn convert<T: ByteValue>(source: Option<&[T]>) -> Result<DestinationBuffer, InvalidInput> {
    let source = source.ok_or(InvalidInput)?;
    Ok(convert_slice(source))
}

pub fn convert_slice<T: ByteValue>(source: &[T]) -> DestinationBuffer {
    let mut buf = Vec::with_capacity(source.len());
    for value in source {
        buf.push(value.to_byte());
    }
    DestinationBuffer(buf.into_boxed_slice())
}

/// Receive buffer for one datagram.
pub struct PacketBuffer {
    buf: Vec<u8>,
}

impl PacketBuffer {
    pub fn new() -> Self {
        PacketBuffer {
            buf: vec![0u8; MAX_PACKET_SIZE],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn take_slice(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.buf.len())]
    }

    /// Copies the first `len` received bytes out, leaving the buffer reusable.
    pub fn trimmed(&self, len: usize) -> DestinationBuffer {
        convert_slice(self.take_slice(len))
    }
}
