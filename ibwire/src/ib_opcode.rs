//! BTH opcode space and the mapping from opcode to the chain of
//! extended transport headers that follows the BTH.

/// Reliable Connection opcodes, 0x00 base.
pub mod rc_op {
    pub type Type = u8;
    pub const SEND_FIRST: Type = 0x00;
    pub const SEND_MIDDLE: Type = 0x01;
    pub const SEND_LAST: Type = 0x02;
    pub const SEND_LAST_IMM: Type = 0x03;
    pub const SEND_ONLY: Type = 0x04;
    pub const SEND_ONLY_IMM: Type = 0x05;
    pub const RDMA_WRITE_FIRST: Type = 0x06;
    pub const RDMA_WRITE_MIDDLE: Type = 0x07;
    pub const RDMA_WRITE_LAST: Type = 0x08;
    pub const RDMA_WRITE_LAST_IMM: Type = 0x09;
    pub const RDMA_WRITE_ONLY: Type = 0x0A;
    pub const RDMA_WRITE_ONLY_IMM: Type = 0x0B;
    pub const RDMA_READ_REQUEST: Type = 0x0C;
    pub const RDMA_READ_RESPONSE_FIRST: Type = 0x0D;
    pub const RDMA_READ_RESPONSE_MIDDLE: Type = 0x0E;
    pub const RDMA_READ_RESPONSE_LAST: Type = 0x0F;
    pub const RDMA_READ_RESPONSE_ONLY: Type = 0x10;
    pub const ACKNOWLEDGE: Type = 0x11;
    pub const ATOMIC_ACKNOWLEDGE: Type = 0x12;
    pub const CMP_SWAP: Type = 0x13;
    pub const FETCH_ADD: Type = 0x14;
    pub const SEND_LAST_INVAL: Type = 0x16;
    pub const SEND_ONLY_INVAL: Type = 0x17;
}

/// Unreliable Connection opcodes, 0x20 base.
pub mod uc_op {
    pub type Type = u8;
    pub const SEND_FIRST: Type = 0x20;
    pub const SEND_MIDDLE: Type = 0x21;
    pub const SEND_LAST: Type = 0x22;
    pub const SEND_LAST_IMM: Type = 0x23;
    pub const SEND_ONLY: Type = 0x24;
    pub const SEND_ONLY_IMM: Type = 0x25;
    pub const RDMA_WRITE_FIRST: Type = 0x26;
    pub const RDMA_WRITE_MIDDLE: Type = 0x27;
    pub const RDMA_WRITE_LAST: Type = 0x28;
    pub const RDMA_WRITE_LAST_IMM: Type = 0x29;
    pub const RDMA_WRITE_ONLY: Type = 0x2A;
    pub const RDMA_WRITE_ONLY_IMM: Type = 0x2B;
}

/// Reliable Datagram opcodes, 0x40 base. Every RD packet leads with an
/// RDETH; requests additionally carry a DETH.
pub mod rd_op {
    pub type Type = u8;
    pub const SEND_FIRST: Type = 0x40;
    pub const SEND_MIDDLE: Type = 0x41;
    pub const SEND_LAST: Type = 0x42;
    pub const SEND_LAST_IMM: Type = 0x43;
    pub const SEND_ONLY: Type = 0x44;
    pub const SEND_ONLY_IMM: Type = 0x45;
    pub const RDMA_WRITE_FIRST: Type = 0x46;
    pub const RDMA_WRITE_MIDDLE: Type = 0x47;
    pub const RDMA_WRITE_LAST: Type = 0x48;
    pub const RDMA_WRITE_LAST_IMM: Type = 0x49;
    pub const RDMA_WRITE_ONLY: Type = 0x4A;
    pub const RDMA_WRITE_ONLY_IMM: Type = 0x4B;
    pub const RDMA_READ_REQUEST: Type = 0x4C;
    pub const RDMA_READ_RESPONSE_FIRST: Type = 0x4D;
    pub const RDMA_READ_RESPONSE_MIDDLE: Type = 0x4E;
    pub const RDMA_READ_RESPONSE_LAST: Type = 0x4F;
    pub const RDMA_READ_RESPONSE_ONLY: Type = 0x50;
    pub const ACKNOWLEDGE: Type = 0x51;
    pub const ATOMIC_ACKNOWLEDGE: Type = 0x52;
    pub const CMP_SWAP: Type = 0x53;
    pub const FETCH_ADD: Type = 0x54;
    pub const RESYNC: Type = 0x55;
}

/// Unreliable Datagram opcodes, 0x64 base.
pub mod ud_op {
    pub type Type = u8;
    pub const SEND_ONLY: Type = 0x64;
    pub const SEND_ONLY_IMM: Type = 0x65;
}

/// One extended transport header slot in a resolved chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtHeader {
    Rdeth,
    Deth,
    Reth,
    Atmeth,
    Aeth,
    Atmack,
    Immdt,
    Ieth,
}

impl ExtHeader {
    /// Fixed wire size of the header.
    #[inline]
    pub fn byte_len(self) -> usize {
        use crate::ib_hdr::ib_hdr_length::*;
        match self {
            ExtHeader::Rdeth => IB_RDETH_BYTES as usize,
            ExtHeader::Deth => IB_DETH_BYTES as usize,
            ExtHeader::Reth => IB_RETH_BYTES as usize,
            ExtHeader::Atmeth => IB_ATMETH_BYTES as usize,
            ExtHeader::Aeth => IB_AETH_BYTES as usize,
            ExtHeader::Atmack => IB_ATMACK_BYTES as usize,
            ExtHeader::Immdt => IB_IMMDT_BYTES as usize,
            ExtHeader::Ieth => IB_IETH_BYTES as usize,
        }
    }
}

/// Canonical extended-header orderings selected by the BTH opcode.
/// `Vendor` is the fallback for unclassified opcodes; the bytes after the
/// BTH are then an opaque trailing blob, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSequence {
    RdethDethPayload,
    RdethDethRethPayload,
    RdethDethImmdtPayload,
    RdethDethRethImmdtPayload,
    RdethDethReth,
    RdethAethPayload,
    RdethPayload,
    RdethAeth,
    RdethAethAtmack,
    RdethDethAtmeth,
    RdethDeth,
    DethPayload,
    DethImmdtPayload,
    Payload,
    ImmdtPayload,
    RethPayload,
    RethImmdtPayload,
    Reth,
    AethPayload,
    Aeth,
    AethAtmack,
    Atmeth,
    IethPayload,
    Vendor,
}

impl HeaderSequence {
    /// Extended headers in decode order.
    pub fn headers(self) -> &'static [ExtHeader] {
        use ExtHeader::*;
        use HeaderSequence as H;
        match self {
            H::RdethDethPayload => &[Rdeth, Deth],
            H::RdethDethRethPayload => &[Rdeth, Deth, Reth],
            H::RdethDethImmdtPayload => &[Rdeth, Deth, Immdt],
            H::RdethDethRethImmdtPayload => &[Rdeth, Deth, Reth, Immdt],
            H::RdethDethReth => &[Rdeth, Deth, Reth],
            H::RdethAethPayload => &[Rdeth, Aeth],
            H::RdethPayload => &[Rdeth],
            H::RdethAeth => &[Rdeth, Aeth],
            H::RdethAethAtmack => &[Rdeth, Aeth, Atmack],
            H::RdethDethAtmeth => &[Rdeth, Deth, Atmeth],
            H::RdethDeth => &[Rdeth, Deth],
            H::DethPayload => &[Deth],
            H::DethImmdtPayload => &[Deth, Immdt],
            H::Payload => &[],
            H::ImmdtPayload => &[Immdt],
            H::RethPayload => &[Reth],
            H::RethImmdtPayload => &[Reth, Immdt],
            H::Reth => &[Reth],
            H::AethPayload => &[Aeth],
            H::Aeth => &[Aeth],
            H::AethAtmack => &[Aeth, Atmack],
            H::Atmeth => &[Atmeth],
            H::IethPayload => &[Ieth],
            H::Vendor => &[],
        }
    }

    /// Whether payload bytes follow the extended headers. Vendor opcodes
    /// are treated as payload-bearing so the trailing blob is kept.
    pub fn has_payload(self) -> bool {
        use HeaderSequence::*;
        matches!(
            self,
            RdethDethPayload
                | RdethDethRethPayload
                | RdethDethImmdtPayload
                | RdethDethRethImmdtPayload
                | RdethAethPayload
                | RdethPayload
                | DethPayload
                | DethImmdtPayload
                | Payload
                | ImmdtPayload
                | RethPayload
                | RethImmdtPayload
                | AethPayload
                | IethPayload
                | Vendor
        )
    }
}

// Opcode sets sharing one trailing-header shape. Grouped by shape, not
// by connection type: SEND_MIDDLE looks the same on RC and UC wires.

const OPCODES_PAYLD: [u8; 13] = [
    rc_op::SEND_FIRST,
    rc_op::SEND_MIDDLE,
    rc_op::SEND_LAST,
    rc_op::SEND_ONLY,
    rc_op::RDMA_WRITE_MIDDLE,
    rc_op::RDMA_WRITE_LAST,
    rc_op::RDMA_READ_RESPONSE_MIDDLE,
    uc_op::SEND_FIRST,
    uc_op::SEND_MIDDLE,
    uc_op::SEND_LAST,
    uc_op::SEND_ONLY,
    uc_op::RDMA_WRITE_MIDDLE,
    uc_op::RDMA_WRITE_LAST,
];

const OPCODES_IMMDT_PAYLD: [u8; 6] = [
    rc_op::SEND_LAST_IMM,
    rc_op::SEND_ONLY_IMM,
    rc_op::RDMA_WRITE_LAST_IMM,
    uc_op::SEND_LAST_IMM,
    uc_op::SEND_ONLY_IMM,
    uc_op::RDMA_WRITE_LAST_IMM,
];

const OPCODES_RDETH_DETH_PAYLD: [u8; 6] = [
    rd_op::SEND_FIRST,
    rd_op::SEND_MIDDLE,
    rd_op::SEND_LAST,
    rd_op::SEND_ONLY,
    rd_op::RDMA_WRITE_MIDDLE,
    rd_op::RDMA_WRITE_LAST,
];

const OPCODES_RETH_PAYLD: [u8; 4] = [
    rc_op::RDMA_WRITE_FIRST,
    rc_op::RDMA_WRITE_ONLY,
    uc_op::RDMA_WRITE_FIRST,
    uc_op::RDMA_WRITE_ONLY,
];

const OPCODES_RDETH_DETH_IMMDT_PAYLD: [u8; 3] = [
    rd_op::SEND_LAST_IMM,
    rd_op::SEND_ONLY_IMM,
    rd_op::RDMA_WRITE_LAST_IMM,
];

const OPCODES_AETH_PAYLD: [u8; 3] = [
    rc_op::RDMA_READ_RESPONSE_FIRST,
    rc_op::RDMA_READ_RESPONSE_LAST,
    rc_op::RDMA_READ_RESPONSE_ONLY,
];

const OPCODES_RDETH_AETH_PAYLD: [u8; 3] = [
    rd_op::RDMA_READ_RESPONSE_FIRST,
    rd_op::RDMA_READ_RESPONSE_LAST,
    rd_op::RDMA_READ_RESPONSE_ONLY,
];

const OPCODES_RETH_IMMDT_PAYLD: [u8; 2] = [rc_op::RDMA_WRITE_ONLY_IMM, uc_op::RDMA_WRITE_ONLY_IMM];

const OPCODES_RDETH_DETH_RETH_PAYLD: [u8; 2] = [rd_op::RDMA_WRITE_FIRST, rd_op::RDMA_WRITE_ONLY];

const OPCODES_ATMETH: [u8; 2] = [rc_op::CMP_SWAP, rc_op::FETCH_ADD];

const OPCODES_IETH_PAYLD: [u8; 2] = [rc_op::SEND_LAST_INVAL, rc_op::SEND_ONLY_INVAL];

const OPCODES_RDETH_DETH_ATMETH: [u8; 2] = [rd_op::CMP_SWAP, rd_op::FETCH_ADD];

/// Map a BTH opcode to its extended-header sequence. Total over all
/// `u8` values. Multi-member sets shared across connection types are
/// tested first; they are the common case on a busy fabric.
pub fn resolve(opcode: u8) -> HeaderSequence {
    use HeaderSequence::*;
    if OPCODES_PAYLD.contains(&opcode) {
        return Payload;
    }
    if OPCODES_IMMDT_PAYLD.contains(&opcode) {
        return ImmdtPayload;
    }
    if OPCODES_RDETH_DETH_PAYLD.contains(&opcode) {
        return RdethDethPayload;
    }
    if OPCODES_RETH_PAYLD.contains(&opcode) {
        return RethPayload;
    }
    if OPCODES_RDETH_DETH_IMMDT_PAYLD.contains(&opcode) {
        return RdethDethImmdtPayload;
    }
    if OPCODES_AETH_PAYLD.contains(&opcode) {
        return AethPayload;
    }
    if OPCODES_RDETH_AETH_PAYLD.contains(&opcode) {
        return RdethAethPayload;
    }
    if OPCODES_RETH_IMMDT_PAYLD.contains(&opcode) {
        return RethImmdtPayload;
    }
    if OPCODES_RDETH_DETH_RETH_PAYLD.contains(&opcode) {
        return RdethDethRethPayload;
    }
    if OPCODES_ATMETH.contains(&opcode) {
        return Atmeth;
    }
    if OPCODES_IETH_PAYLD.contains(&opcode) {
        return IethPayload;
    }
    if OPCODES_RDETH_DETH_ATMETH.contains(&opcode) {
        return RdethDethAtmeth;
    }
    match opcode {
        rc_op::RDMA_READ_REQUEST => Reth,
        rc_op::ACKNOWLEDGE => Aeth,
        rc_op::ATOMIC_ACKNOWLEDGE => AethAtmack,
        rd_op::RDMA_WRITE_ONLY_IMM => RdethDethRethImmdtPayload,
        rd_op::RDMA_READ_REQUEST => RdethDethReth,
        rd_op::RDMA_READ_RESPONSE_MIDDLE => RdethPayload,
        rd_op::ACKNOWLEDGE => RdethAeth,
        rd_op::ATOMIC_ACKNOWLEDGE => RdethAethAtmack,
        rd_op::RESYNC => RdethDeth,
        ud_op::SEND_ONLY => DethPayload,
        ud_op::SEND_ONLY_IMM => DethImmdtPayload,
        _ => Vendor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_resolver_total_over_u8() {
        for opcode in 0..=u8::MAX {
            // must classify every opcode, Vendor included, without panicking
            let seq = resolve(opcode);
            let _ = seq.headers();
            let _ = seq.has_payload();
        }
    }

    #[test]
    fn check_send_only_is_bare_payload() {
        assert_eq!(resolve(rc_op::SEND_ONLY), HeaderSequence::Payload);
        assert!(resolve(rc_op::SEND_ONLY).headers().is_empty());
        assert!(resolve(rc_op::SEND_ONLY).has_payload());
    }

    #[test]
    fn check_read_request_is_reth_without_payload() {
        let seq = resolve(rc_op::RDMA_READ_REQUEST);
        assert_eq!(seq, HeaderSequence::Reth);
        assert_eq!(seq.headers(), &[ExtHeader::Reth]);
        assert!(!seq.has_payload());
    }

    #[test]
    fn check_atomic_ack_carries_aeth_then_atmack() {
        let seq = resolve(rc_op::ATOMIC_ACKNOWLEDGE);
        assert_eq!(seq.headers(), &[ExtHeader::Aeth, ExtHeader::Atmack]);
        assert!(!seq.has_payload());
    }

    #[test]
    fn check_rd_chain_leads_with_rdeth() {
        for opcode in 0x40u8..=0x55 {
            let seq = resolve(opcode);
            assert_ne!(seq, HeaderSequence::Vendor, "opcode {opcode:#04x}");
            assert_eq!(seq.headers()[0], ExtHeader::Rdeth, "opcode {opcode:#04x}");
        }
    }

    #[test]
    fn check_unclassified_opcodes_fall_back_to_vendor() {
        assert_eq!(resolve(0x15), HeaderSequence::Vendor);
        assert_eq!(resolve(0x2C), HeaderSequence::Vendor);
        assert_eq!(resolve(0x66), HeaderSequence::Vendor);
        assert_eq!(resolve(0xFF), HeaderSequence::Vendor);
    }

    #[test]
    fn check_ud_send_only() {
        assert_eq!(resolve(ud_op::SEND_ONLY), HeaderSequence::DethPayload);
        assert_eq!(
            resolve(ud_op::SEND_ONLY_IMM),
            HeaderSequence::DethImmdtPayload
        );
    }
}
