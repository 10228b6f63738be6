//! Length-prefixed field reader for command payloads

use super::APDUError;

/// Cursor over a command payload
pub struct PayloadReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Take exactly `n` bytes
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], APDUError> {
        let end = self.offset.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let field = &self.data[self.offset..end];
                self.offset = end;
                Ok(field)
            }
            None => Err(APDUError::Truncated {
                offset: self.offset,
                needed: n,
            }),
        }
    }

    /// Take a fixed-size array
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], APDUError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Take a field prefixed by a 1-byte length
    pub fn take_lv8(&mut self) -> Result<&'a [u8], APDUError> {
        let len = self.take(1)?[0] as usize;
        self.take(len)
    }

    /// Take a field prefixed by a 2-byte big-endian length
    pub fn take_lv16(&mut self) -> Result<&'a [u8], APDUError> {
        let len = u16::from_be_bytes(self.take_array()?) as usize;
        self.take(len)
    }

    pub fn take_i32(&mut self) -> Result<i32, APDUError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Succeeds only if every byte was consumed
    pub fn finish(self) -> Result<(), APDUError> {
        match self.data.len() - self.offset {
            0 => Ok(()),
            extra => Err(APDUError::TrailingBytes(extra)),
        }
    }
}

/// Append a field with a 1-byte length prefix
pub fn push_lv8(out: &mut Vec<u8>, field: &[u8]) {
    out.push(field.len() as u8);
    out.extend_from_slice(field);
}

/// Append a field with a 2-byte big-endian length prefix
pub fn push_lv16(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u16).to_be_bytes());
    out.extend_from_slice(field);
}
