use thiserror::Error;

/// Fatal decode failures for the current packet.
///
/// Unknown opcodes, attribute IDs and management classes are not errors:
/// each has a fallback decode path (vendor header sequence, opaque blob,
/// reserved-class marker) so decoding completes for any packet whose
/// declared length is consistent with its header chain.
#[derive(Debug, Error)]
pub enum DissectError {
    /// Captured bytes end before a required fixed-size header completes.
    /// Fields emitted before the boundary remain valid.
    #[error("truncated buffer: need {need} bytes at offset {offset}, {have} captured")]
    TruncatedBuffer {
        offset: usize,
        need: usize,
        have: usize,
    },
    /// The declared packet length cannot cover the bytes required by the
    /// resolved header chain. The remainder is abandoned, not guessed at.
    #[error("malformed packet at offset {offset}: {reason}")]
    MalformedPacket { offset: usize, reason: &'static str },
    /// A registered sub-dissector failed deep inside an embedded payload
    /// and the CRC trailer could not be recovered.
    #[error("sub-protocol decode failed for ethertype {ethertype:#06x}")]
    SubProtocol {
        ethertype: u16,
        #[source]
        source: SubDissectError,
    },
}

/// Failure reported by an Ethertype-registered sub-dissector.
///
/// `Truncated` is the variant that may surface through the payload
/// dispatch boundary; anything else is downgraded to an annotation.
#[derive(Debug, Error)]
pub enum SubDissectError {
    #[error("truncated payload: need {need} bytes, {have} available")]
    Truncated { need: usize, have: usize },
    #[error("{0}")]
    Other(String),
}
