use crate::ib_error::DissectError;
use bytes::Bytes;
use likely_stable::unlikely;

/// Trailing CRC sizes, selected from the residual length budget.
pub const IB_ICRC_SIZE: usize = 4;
pub const IB_VCRC_SIZE: usize = 2;

/// Read cursor over one captured packet.
///
/// All reads are big-endian and bounds-checked against the captured
/// buffer. `remaining` is the reported-length budget seeded from the LRH
/// packet length field; header decoders decrement it as they consume
/// bytes. The captured buffer may be shorter than the reported length,
/// so the two limits fail differently: running past the capture is
/// `TruncatedBuffer`, running past the declared length is
/// `MalformedPacket`.
///
/// Invariant: `remaining == reported_total - bytes_consumed_so_far` at
/// every header boundary, and it lands exactly on the CRC trailer size
/// (6, 4 or 2 bytes) at the end of a well-formed packet.
#[derive(Debug, Clone)]
pub struct PktView {
    buf: Bytes,
    offset: usize,
    remaining: usize,
}

impl PktView {
    pub fn new(buf: Bytes) -> Self {
        PktView {
            buf,
            offset: 0,
            remaining: 0,
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn captured_len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn bytes_available_from(&self, offset: usize) -> usize {
        self.buf.len().saturating_sub(offset)
    }

    /// Guard a fixed-size read at the current offset. Every header
    /// decoder calls this before consuming its layout.
    #[inline]
    pub fn require(&self, need: usize) -> Result<(), DissectError> {
        if unlikely(self.bytes_available_from(self.offset) < need) {
            return Err(DissectError::TruncatedBuffer {
                offset: self.offset,
                need,
                have: self.bytes_available_from(self.offset),
            });
        }
        Ok(())
    }

    /// Seed the reported-length budget (LRH packet length in bytes, or
    /// the GRH payload length when the GRH diverts to payload dispatch).
    #[inline]
    pub fn seed_budget(&mut self, total: usize) {
        self.remaining = total;
    }

    #[inline]
    pub fn budget(&self) -> usize {
        self.remaining
    }

    /// Charge `n` bytes against the declared packet length.
    #[inline]
    pub fn consume_budget(&mut self, n: usize) -> Result<(), DissectError> {
        if unlikely(n > self.remaining) {
            return Err(DissectError::MalformedPacket {
                offset: self.offset,
                reason: "declared packet length too short for header chain",
            });
        }
        self.remaining -= n;
        Ok(())
    }

    /// Skip `n` bytes without interpreting them (reserved regions).
    #[inline]
    pub fn advance(&mut self, n: usize) -> Result<(), DissectError> {
        self.require(n)?;
        self.offset += n;
        Ok(())
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DissectError> {
        self.require(1)?;
        let v = self.buf[self.offset];
        self.offset += 1;
        Ok(v)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, DissectError> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.buf[self.offset], self.buf[self.offset + 1]]);
        self.offset += 2;
        Ok(v)
    }

    #[inline]
    pub fn read_u24(&mut self) -> Result<u32, DissectError> {
        self.require(3)?;
        let v = ((self.buf[self.offset] as u32) << 16)
            | ((self.buf[self.offset + 1] as u32) << 8)
            | (self.buf[self.offset + 2] as u32);
        self.offset += 3;
        Ok(v)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, DissectError> {
        self.require(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.offset..self.offset + 4]);
        self.offset += 4;
        Ok(u32::from_be_bytes(raw))
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, DissectError> {
        self.require(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.offset..self.offset + 8]);
        self.offset += 8;
        Ok(u64::from_be_bytes(raw))
    }

    /// 128-bit GID, returned in wire order.
    #[inline]
    pub fn read_gid(&mut self) -> Result<[u8; 16], DissectError> {
        self.require(16)?;
        let mut gid = [0u8; 16];
        gid.copy_from_slice(&self.buf[self.offset..self.offset + 16]);
        self.offset += 16;
        Ok(gid)
    }

    /// Non-advancing big-endian u16 at an absolute offset.
    #[inline]
    pub fn peek_u16_at(&self, offset: usize) -> Result<u16, DissectError> {
        if unlikely(self.bytes_available_from(offset) < 2) {
            return Err(DissectError::TruncatedBuffer {
                offset,
                need: 2,
                have: self.bytes_available_from(offset),
            });
        }
        Ok(u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]))
    }

    /// Cheap sub-slice of the captured buffer (no copy).
    pub fn slice(&self, offset: usize, len: usize) -> Result<Bytes, DissectError> {
        if unlikely(self.bytes_available_from(offset) < len) {
            return Err(DissectError::TruncatedBuffer {
                offset,
                need: len,
                have: self.bytes_available_from(offset),
            });
        }
        Ok(self.buf.slice(offset..offset + len))
    }

    /// Read `len` bytes as an owned sub-slice, advancing the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, DissectError> {
        let b = self.slice(self.offset, len)?;
        self.offset += len;
        Ok(b)
    }

    /// Reposition to an absolute offset already known to be decoded past
    /// (fixed-size windows such as the 64-byte SMP attribute block).
    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(bytes: &[u8]) -> PktView {
        PktView::new(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn check_big_endian_reads() {
        let mut pkt = view(&[0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0]);
        assert_eq!(pkt.read_u16().unwrap(), 0x1234);
        assert_eq!(pkt.read_u24().unwrap(), 0x56789a);
        assert_eq!(pkt.read_u8().unwrap(), 0xbc);
        assert_eq!(pkt.read_u16().unwrap(), 0xdef0);
        assert_eq!(pkt.offset(), 8);
    }

    #[test]
    fn check_truncated_read_is_error_not_panic() {
        let mut pkt = view(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        pkt.advance(4).unwrap();
        let err = pkt.read_u32().unwrap_err();
        match err {
            DissectError::TruncatedBuffer { offset, need, have } => {
                assert_eq!(offset, 4);
                assert_eq!(need, 4);
                assert_eq!(have, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // a failed read does not move the cursor
        assert_eq!(pkt.offset(), 4);
    }

    #[test]
    fn check_budget_accounting() {
        let mut pkt = view(&[0u8; 32]);
        pkt.seed_budget(20);
        pkt.consume_budget(12).unwrap();
        assert_eq!(pkt.budget(), 8);
        assert!(pkt.consume_budget(9).is_err());
        // a failed charge leaves the budget untouched
        assert_eq!(pkt.budget(), 8);
        pkt.consume_budget(8).unwrap();
        assert_eq!(pkt.budget(), 0);
    }

    #[test]
    fn check_gid_read() {
        let raw: Vec<u8> = (0u8..16).collect();
        let mut pkt = view(&raw);
        let gid = pkt.read_gid().unwrap();
        assert_eq!(gid[0], 0);
        assert_eq!(gid[15], 15);
    }
}
