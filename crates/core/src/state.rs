//! Fixed-layout save-state codec.
//!
//! Save states are packed field by field, little-endian, in a fixed order
//! decided by each component's `save`/`load` pair. The same build always
//! produces the same byte layout, so a blob captured from one instance
//! restores a byte-identical observable state in another. Nothing here is
//! self-describing on purpose: versioning across builds is the consumer's
//! responsibility.

/// Sequential little-endian writer for save-state blobs.
#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential little-endian reader over a save-state blob.
///
/// Reads past the end of the blob yield zeros rather than panicking; a
/// truncated blob restores a truncated-but-defined state, consistent with
/// the "no panics from valid inputs" policy at the library boundary.
#[derive(Debug)]
pub struct StateReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let avail = self.buf.len().saturating_sub(self.pos).min(N);
        out[..avail].copy_from_slice(&self.buf[self.pos..self.pos + avail]);
        self.pos += N;
        out
    }

    pub fn get_u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn get_bool(&mut self) -> bool {
        self.get_u8() != 0
    }

    pub fn get_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take::<2>())
    }

    pub fn get_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    pub fn get_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take::<8>())
    }

    pub fn get_i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take::<2>())
    }

    pub fn get_i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take::<4>())
    }

    pub fn get_bytes(&mut self, out: &mut [u8]) {
        let avail = self.buf.len().saturating_sub(self.pos).min(out.len());
        out[..avail].copy_from_slice(&self.buf[self.pos..self.pos + avail]);
        out[avail..].fill(0);
        self.pos += out.len();
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars() {
        let mut w = StateWriter::new();
        w.put_u8(0xAB);
        w.put_u16(0x1234);
        w.put_u32(0xDEADBEEF);
        w.put_u64(0x0102030405060708);
        w.put_bool(true);
        w.put_i16(-1234);
        let blob = w.into_vec();

        let mut r = StateReader::new(&blob);
        assert_eq!(r.get_u8(), 0xAB);
        assert_eq!(r.get_u16(), 0x1234);
        assert_eq!(r.get_u32(), 0xDEADBEEF);
        assert_eq!(r.get_u64(), 0x0102030405060708);
        assert!(r.get_bool());
        assert_eq!(r.get_i16(), -1234);
        assert_eq!(r.position(), blob.len());
    }

    #[test]
    fn little_endian_layout() {
        let mut w = StateWriter::new();
        w.put_u16(0x1234);
        assert_eq!(w.into_vec(), vec![0x34, 0x12]);
    }

    #[test]
    fn byte_regions() {
        let mut w = StateWriter::new();
        w.put_bytes(&[1, 2, 3, 4]);
        let blob = w.into_vec();

        let mut r = StateReader::new(&blob);
        let mut out = [0u8; 4];
        r.get_bytes(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn truncated_blob_reads_zero() {
        let blob = [0xFFu8; 2];
        let mut r = StateReader::new(&blob);
        assert_eq!(r.get_u32(), 0x0000FFFF);
        assert_eq!(r.get_u8(), 0);
    }
}
