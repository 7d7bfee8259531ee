/// Little-endian byte cursor over a complete capture buffer.
use crate::error::{DecodeError, Result};

/// Sequential reader tracking its byte offset for error reporting.
///
/// Every read either consumes exactly the requested bytes or fails with
/// [`DecodeError::TruncatedStream`]; nothing is consumed on failure.
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over the full buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes remaining in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Take the next `len` bytes as a slice.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::TruncatedStream {
                offset: self.offset,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Read a fixed 16-byte identifier.
    pub fn read_uuid(&mut self) -> Result<[u8; 16]> {
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(self.take(16)?);
        Ok(uuid)
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian f64.
    pub fn read_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read `count` consecutive little-endian f32 values.
    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let bytes = self.take(N * 4)?;
        let mut out = [0.0f32; N];
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            out[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(out)
    }

    /// Read `count` packed 3-component f32 vectors.
    pub fn read_vec3_list(&mut self, count: usize) -> Result<Vec<[f32; 3]>> {
        let bytes = self.take(count * 12)?;
        let mut out = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(12) {
            out.push([
                f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                f32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]),
            ]);
        }
        Ok(out)
    }

    /// Read `count` packed 3-component u32 index triples.
    pub fn read_index_list(&mut self, count: usize) -> Result<Vec<[u32; 3]>> {
        let bytes = self.take(count * 12)?;
        let mut out = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(12) {
            out.push([
                u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]),
            ]);
        }
        Ok(out)
    }

    /// Read `count` packed little-endian f32 values into a flat buffer.
    pub fn read_f32_list(&mut self, count: usize) -> Result<Vec<f32>> {
        let bytes = self.take(count * 4)?;
        let mut out = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(4) {
            out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_consume_exact_bytes() {
        let data = [1u8, 0, 2, 0, 0, 0];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 1);
        assert_eq!(r.remaining(), 4);
        assert_eq!(r.read_u32().unwrap(), 2);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_reports_position() {
        let data = [0u8; 3];
        let mut r = ByteReader::new(&data);
        r.read_u16().unwrap();
        let err = r.read_u32().unwrap_err();
        match err {
            DecodeError::TruncatedStream {
                offset,
                needed,
                remaining,
            } => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
                assert_eq!(remaining, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_read_consumes_nothing() {
        let data = [0u8; 2];
        let mut r = ByteReader::new(&data);
        assert!(r.read_u32().is_err());
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.read_u16().unwrap(), 0);
    }

    #[test]
    fn vec3_list_round_trips_le_bytes() {
        let mut data = Vec::new();
        for v in [1.0f32, 2.0, 3.0, -4.0, 5.5, 6.25] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = ByteReader::new(&data);
        let list = r.read_vec3_list(2).unwrap();
        assert_eq!(list, vec![[1.0, 2.0, 3.0], [-4.0, 5.5, 6.25]]);
    }
}
