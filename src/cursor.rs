pub struct Cursor<'a> {
    buf: &'a [u8],
    current: usize,
}

impl<'a> Cursor<'a> {
    pub fn from(buf: &'a [u8]) -> Self {
        Cursor {
            buf,
            current: 0,
        }
    }

    pub fn at(&mut self, index: usize) {
        self.current = index;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.current)
    }

    pub fn take(&mut self) -> Option<u8> {
        let result = *self.buf.get(self.current)?;
        self.current += 1;
        Some(result)
    }

    pub fn take_u16(&mut self) -> Option<u16> {
        let slice = self.take_slice(2)?;
        Some(u16::from_be_bytes([slice[0], slice[1]]))
    }

    pub fn take_u32(&mut self) -> Option<u32> {
        let slice = self.take_slice(4)?;
        Some(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    pub fn take_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let result = &self.buf[self.current..self.current + len];
        self.current += len;
        Some(result)
    }
}
