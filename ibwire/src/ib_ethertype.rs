use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use etherparse::{Ipv4Header, Ipv6Header, ReadError};
use fxhash::FxHashMap;

use crate::ib_error::SubDissectError;
use crate::ib_field::FieldSink;

/// Well-known Ethertype values for the payload heuristic.
pub mod ethertype {
    pub type Type = u16;
    pub const IPV4: Type = 0x0800;
    pub const ARP: Type = 0x0806;
    pub const VLAN: Type = 0x8100;
    pub const IPV6: Type = 0x86DD;
    pub const ROCE: Type = 0x8915;
}

/// Externally supplied next-protocol decoder for an embedded payload.
///
/// `offset` is the absolute packet offset of `payload`, so emitted
/// FieldRecords carry real byte ranges. A `Truncated` failure may
/// surface through the payload-dispatch boundary; anything else is
/// downgraded to an annotation there.
pub trait SubDissector {
    fn dissect(
        &self,
        payload: Bytes,
        offset: usize,
        sink: &mut FieldSink,
    ) -> Result<(), SubDissectError>;
}

/// Ethertype-keyed dispatch table. Callers register their own handlers;
/// `with_defaults` seeds summary decoders for IPv4 and IPv6.
#[derive(Default)]
pub struct EtherTypeRegistry {
    handlers: FxHashMap<u16, Box<dyn SubDissector>>,
}

impl EtherTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(ethertype::IPV4, Box::new(Ipv4Summary));
        reg.register(ethertype::IPV6, Box::new(Ipv6Summary));
        reg
    }

    pub fn register(&mut self, ethertype: u16, handler: Box<dyn SubDissector>) {
        self.handlers.insert(ethertype, handler);
    }

    pub fn is_registered(&self, ethertype: u16) -> bool {
        self.handlers.contains_key(&ethertype)
    }

    /// `None` when no handler is registered for the Ethertype; the
    /// caller then falls back to the opaque data sink.
    pub fn dissect(
        &self,
        ethertype: u16,
        payload: Bytes,
        offset: usize,
        sink: &mut FieldSink,
    ) -> Option<Result<(), SubDissectError>> {
        self.handlers
            .get(&ethertype)
            .map(|h| h.dissect(payload, offset, sink))
    }
}

fn map_read_error(err: ReadError, have: usize) -> SubDissectError {
    match err {
        ReadError::UnexpectedEndOfSlice(need) => SubDissectError::Truncated { need, have },
        other => SubDissectError::Other(format!("{other:?}")),
    }
}

/// Summary decode of an encapsulated IPv4 header.
pub struct Ipv4Summary;

impl SubDissector for Ipv4Summary {
    fn dissect(
        &self,
        payload: Bytes,
        offset: usize,
        sink: &mut FieldSink,
    ) -> Result<(), SubDissectError> {
        let (hdr, _rest) =
            Ipv4Header::from_slice(&payload).map_err(|e| map_read_error(e, payload.len()))?;
        sink.put_u8("ipv4.protocol", offset + 9, hdr.protocol);
        sink.put_u8("ipv4.ttl", offset + 8, hdr.time_to_live);
        sink.put_text(
            "ipv4.src",
            offset + 12,
            4,
            Ipv4Addr::from(hdr.source).to_string(),
        );
        sink.put_text(
            "ipv4.dst",
            offset + 16,
            4,
            Ipv4Addr::from(hdr.destination).to_string(),
        );
        Ok(())
    }
}

/// Summary decode of an encapsulated IPv6 header. Also serves the
/// raw-IPv6 link-next-header path.
pub struct Ipv6Summary;

impl SubDissector for Ipv6Summary {
    fn dissect(
        &self,
        payload: Bytes,
        offset: usize,
        sink: &mut FieldSink,
    ) -> Result<(), SubDissectError> {
        let (hdr, _rest) =
            Ipv6Header::from_slice(&payload).map_err(|e| map_read_error(e, payload.len()))?;
        sink.put_u8("ipv6.next_header", offset + 6, hdr.next_header);
        sink.put_u8("ipv6.hop_limit", offset + 7, hdr.hop_limit);
        sink.put_u16("ipv6.payload_length", offset + 4, hdr.payload_length);
        sink.put_text(
            "ipv6.src",
            offset + 8,
            16,
            Ipv6Addr::from(hdr.source).to_string(),
        );
        sink.put_text(
            "ipv6.dst",
            offset + 24,
            16,
            Ipv6Addr::from(hdr.destination).to_string(),
        );
        Ok(())
    }
}

/// Fallback sink when the heuristic finds no Ethertype framing or no
/// registrant matches.
pub fn emit_opaque(name: &'static str, payload: Bytes, offset: usize, sink: &mut FieldSink) {
    sink.put_bytes(name, offset, payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ipv4_summary_fields() {
        let mut raw = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00,
        ];
        raw.extend_from_slice(&[10, 0, 0, 1]);
        raw.extend_from_slice(&[10, 0, 0, 2]);
        let reg = EtherTypeRegistry::with_defaults();
        let mut sink = FieldSink::new();
        reg.dissect(ethertype::IPV4, Bytes::from(raw), 100, &mut sink)
            .unwrap()
            .unwrap();
        let src = sink.find("ipv4.src").unwrap();
        assert_eq!(src.offset, 112);
        assert_eq!(src.value, crate::ib_field::FieldValue::Text("10.0.0.1".into()));
    }

    #[test]
    fn check_truncated_payload_surfaces() {
        let reg = EtherTypeRegistry::with_defaults();
        let mut sink = FieldSink::new();
        let res = reg
            .dissect(ethertype::IPV6, Bytes::from_static(&[0x60, 0x00]), 0, &mut sink)
            .unwrap();
        assert!(matches!(res, Err(SubDissectError::Truncated { .. })));
    }

    #[test]
    fn check_unregistered_ethertype_is_none() {
        let reg = EtherTypeRegistry::with_defaults();
        let mut sink = FieldSink::new();
        assert!(reg
            .dissect(ethertype::ARP, Bytes::new(), 0, &mut sink)
            .is_none());
    }
}
