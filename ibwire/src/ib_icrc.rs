use crate::ib_hdr::ib_hdr_length::{IB_GRH_BYTES, IB_LRH_BYTES};

/// Invariant CRC over the packet from the LRH through the end of the
/// payload. Fields that routers may rewrite in flight are masked to
/// ones before hashing: the LRH virtual lane, the GRH traffic class,
/// flow label and hop limit, and the BTH reserved byte. The 32-bit
/// value trails the payload least-significant byte first, like an
/// Ethernet FCS.
pub fn compute_icrc(covered: &[u8], has_grh: bool) -> u32 {
    let mut scratch = covered.to_vec();
    if let Some(b) = scratch.first_mut() {
        *b |= 0xF0; // LRH VL
    }
    let lrh = IB_LRH_BYTES as usize;
    if has_grh && scratch.len() >= lrh + IB_GRH_BYTES as usize {
        scratch[lrh] |= 0x0F; // traffic class high nibble
        scratch[lrh + 1] = 0xFF; // traffic class low nibble + flow label
        scratch[lrh + 2] = 0xFF;
        scratch[lrh + 3] = 0xFF;
        scratch[lrh + 7] = 0xFF; // hop limit
    }
    let bth = lrh + if has_grh { IB_GRH_BYTES as usize } else { 0 };
    if scratch.len() > bth + 4 {
        scratch[bth + 4] = 0xFF; // BTH reserved byte ahead of the QPN
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&scratch);
    hasher.finalize()
}

pub fn verify_icrc(covered: &[u8], has_grh: bool, icrc: u32) -> bool {
    compute_icrc(covered, has_grh) == icrc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_round_trip() {
        let pkt: Vec<u8> = (0u8..64).collect();
        let icrc = compute_icrc(&pkt, false);
        assert!(verify_icrc(&pkt, false, icrc));
        assert!(!verify_icrc(&pkt, false, icrc ^ 1));
    }

    #[test]
    fn check_variant_fields_do_not_affect_icrc() {
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        // virtual lane differs
        a[0] = 0x00;
        b[0] = 0xF0;
        assert_eq!(compute_icrc(&a, false), compute_icrc(&b, false));
        // BTH reserved byte differs (LRH-local packet, BTH at 8)
        a[12] = 0x00;
        b[12] = 0xAB;
        assert_eq!(compute_icrc(&a, false), compute_icrc(&b, false));
        // with a GRH, hop limit differs
        let mut c = vec![0u8; 64];
        let mut d = vec![0u8; 64];
        c[15] = 1;
        d[15] = 64;
        assert_eq!(compute_icrc(&c, true), compute_icrc(&d, true));
    }

    #[test]
    fn check_invariant_fields_do_affect_icrc() {
        let a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        b[2] = 0x01; // DLID is invariant
        assert_ne!(compute_icrc(&a, false), compute_icrc(&b, false));
    }
}
