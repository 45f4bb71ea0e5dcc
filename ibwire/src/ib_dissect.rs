use tracing::{debug, warn};

use crate::ib_error::DissectError;
use crate::ib_ethertype::{emit_opaque, ethertype, EtherTypeRegistry};
use crate::ib_field::FieldSink;
use crate::ib_hdr::{
    IbAeth, IbAtmack, IbAtmeth, IbBth, IbDeth, IbGrh, IbIeth, IbImmdt, IbLrh, IbRdeth, IbReth,
    LinkNextHeader,
};
use crate::ib_icrc::verify_icrc;
use crate::ib_mad::{self, MAD_BYTES};
use crate::ib_opcode::{resolve, ExtHeader, HeaderSequence};
use crate::ib_pkt::{PktView, IB_ICRC_SIZE, IB_VCRC_SIZE};
use crate::ib_schema::IbSchema;

/// Decode outcome for callers that index packets rather than render
/// field trees.
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub virtual_lane: u8,
    pub link_version: u8,
    pub service_level: u8,
    pub link_next_header: LinkNextHeader,
    pub packet_length_bytes: usize,
    pub dlid: u16,
    pub slid: u16,
    pub opcode: Option<u8>,
    pub sequence: Option<HeaderSequence>,
    pub dest_qp: Option<u32>,
    pub psn: Option<u32>,
    pub management: bool,
}

/// Which CRC trailer the current decode path expects. The residual
/// length budget has the final say; a short residual degrades to the
/// smaller trailer rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrailerKind {
    /// IBA transport packets close with ICRC + VCRC
    IcrcVcrc,
    /// raw / non-IBA payloads carry only the variant CRC
    VcrcOnly,
}

impl TrailerKind {
    fn size(self) -> usize {
        match self {
            TrailerKind::IcrcVcrc => IB_ICRC_SIZE + IB_VCRC_SIZE,
            TrailerKind::VcrcOnly => IB_VCRC_SIZE,
        }
    }
}

/// One-packet decoder over a [`PktView`]. Holds only borrowed
/// configuration, so one instance may serve any number of packets and
/// callers may fan decodes out across threads, one `PktView` each.
pub struct IbDissector<'a> {
    schema: &'a IbSchema,
    ethertypes: &'a EtherTypeRegistry,
}

impl<'a> IbDissector<'a> {
    pub fn new(schema: &'a IbSchema, ethertypes: &'a EtherTypeRegistry) -> Self {
        IbDissector { schema, ethertypes }
    }

    /// Decode one packet. Fields emitted before an error remain in the
    /// sink; a `MalformedPacket` failure is additionally surfaced as a
    /// single diagnostic field before the remainder is abandoned.
    pub fn dissect(
        &self,
        pkt: &mut PktView,
        sink: &mut FieldSink,
    ) -> Result<PacketSummary, DissectError> {
        match self.dissect_inner(pkt, sink) {
            Err(err @ DissectError::MalformedPacket { .. }) => {
                warn!("{err}");
                sink.note("malformed", pkt.offset(), err.to_string());
                Err(err)
            }
            other => other,
        }
    }

    fn dissect_inner(
        &self,
        pkt: &mut PktView,
        sink: &mut FieldSink,
    ) -> Result<PacketSummary, DissectError> {
        let lrh = IbLrh::parse(pkt, sink)?;
        let mut summary = PacketSummary {
            virtual_lane: lrh.vl(),
            link_version: lrh.lver(),
            service_level: lrh.sl(),
            link_next_header: lrh.lnh(),
            packet_length_bytes: lrh.packet_length_bytes(),
            dlid: lrh.dlid,
            slid: lrh.slid,
            opcode: None,
            sequence: None,
            dest_qp: None,
            psn: None,
            management: lrh.is_management_lane(),
        };

        match lrh.lnh() {
            LinkNextHeader::Global => {
                let grh = IbGrh::parse(pkt, sink)?;
                if !grh.is_iba_transport() {
                    debug!(
                        nxthdr = grh.nxthdr,
                        "GRH next header is not IBA transport, no BTH follows"
                    );
                    // the GRH's own payload length governs from here on
                    pkt.seed_budget(grh.paylen as usize);
                    self.dispatch_payload(&lrh, pkt, sink, TrailerKind::VcrcOnly, false)?;
                    return Ok(summary);
                }
                self.dissect_transport(&lrh, true, pkt, sink, &mut summary)?;
            }
            LinkNextHeader::Local => {
                self.dissect_transport(&lrh, false, pkt, sink, &mut summary)?;
            }
            LinkNextHeader::RawIpv6 => {
                self.dispatch_raw_ipv6(pkt, sink)?;
            }
            LinkNextHeader::Raw => {
                self.dispatch_opaque(pkt, sink, TrailerKind::VcrcOnly, false)?;
            }
        }
        Ok(summary)
    }

    fn dissect_transport(
        &self,
        lrh: &IbLrh,
        has_grh: bool,
        pkt: &mut PktView,
        sink: &mut FieldSink,
        summary: &mut PacketSummary,
    ) -> Result<(), DissectError> {
        let bth = IbBth::parse(pkt, sink)?;
        let seq = resolve(bth.opcode);
        sink.put_text(
            "bth.opcode_name",
            pkt.offset() - 12,
            1,
            self.schema.opcode_name(bth.opcode).to_string(),
        );
        debug!(opcode = bth.opcode, ?seq, "transport header chain resolved");
        summary.opcode = Some(bth.opcode);
        summary.sequence = Some(seq);
        summary.dest_qp = Some(bth.dqpn());
        summary.psn = Some(bth.psn());

        for hdr in seq.headers() {
            match hdr {
                ExtHeader::Rdeth => {
                    IbRdeth::parse(pkt, sink)?;
                }
                ExtHeader::Deth => {
                    IbDeth::parse(pkt, sink)?;
                }
                ExtHeader::Reth => {
                    IbReth::parse(pkt, sink)?;
                }
                ExtHeader::Atmeth => {
                    IbAtmeth::parse(pkt, sink)?;
                }
                ExtHeader::Aeth => {
                    IbAeth::parse(pkt, sink)?;
                }
                ExtHeader::Atmack => {
                    IbAtmack::parse(pkt, sink)?;
                }
                ExtHeader::Immdt => {
                    IbImmdt::parse(pkt, sink)?;
                }
                ExtHeader::Ieth => {
                    IbIeth::parse(pkt, sink)?;
                }
            }
        }

        if seq == HeaderSequence::Vendor {
            // unrecognized opcode: the remainder is an opaque trailing
            // blob, never run through the Ethertype heuristic
            return self.dispatch_opaque(pkt, sink, TrailerKind::IcrcVcrc, has_grh);
        }
        if seq.has_payload() {
            self.dispatch_payload(lrh, pkt, sink, TrailerKind::IcrcVcrc, has_grh)
        } else {
            self.finish_without_payload(pkt, sink, has_grh)
        }
    }

    /// Decide what the remaining bytes are: a Management Datagram on
    /// the management lane, an Ethertype-framed payload when the
    /// 4-byte prefix matches the (best-effort) framing heuristic, or
    /// opaque data.
    fn dispatch_payload(
        &self,
        lrh: &IbLrh,
        pkt: &mut PktView,
        sink: &mut FieldSink,
        kind: TrailerKind,
        has_grh: bool,
    ) -> Result<(), DissectError> {
        let trailer = kind.size();
        let residual = pkt.budget();
        if residual < trailer {
            return Err(DissectError::MalformedPacket {
                offset: pkt.offset(),
                reason: "residual length cannot cover the CRC trailer",
            });
        }

        if lrh.is_management_lane() {
            // the MAD window is fixed 256 bytes; whatever the declared
            // length leaves after it is the trailer
            if residual < MAD_BYTES {
                return Err(DissectError::MalformedPacket {
                    offset: pkt.offset(),
                    reason: "management lane payload shorter than a MAD",
                });
            }
            ib_mad::parse_mad(self.schema, pkt, sink)?;
            let excess = pkt.budget().saturating_sub(trailer);
            if excess > 0 {
                let base = pkt.offset();
                let blob = pkt.read_bytes(excess)?;
                emit_opaque("payload.data", blob, base, sink);
                pkt.consume_budget(excess)?;
            }
            return self.emit_trailer(pkt, sink, has_grh);
        }

        let payload_len = residual - trailer;
        if payload_len >= 4 {
            let base = pkt.offset();
            let etype = pkt.peek_u16_at(base)?;
            let reserved = pkt.peek_u16_at(base + 2)?;
            // no positive framing signal exists on the wire; two zero
            // bytes after a plausible Ethertype is the best available
            if reserved == 0 {
                sink.put_u16("payload.ethertype", base, etype);
                sink.put_text(
                    "payload.ethertype_name",
                    base,
                    2,
                    self.schema.ethertype_name(etype).to_string(),
                );
                sink.put_u16("payload.reserved", base + 2, reserved);
                let sub_len = payload_len - 4;
                let avail = pkt.bytes_available_from(base + 4).min(sub_len);
                let sub = pkt.slice(base + 4, avail)?;
                match self.ethertypes.dissect(etype, sub.clone(), base + 4, sink) {
                    None => emit_opaque("payload.data", sub, base + 4, sink),
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        // a truncation deep in the embedded payload only
                        // surfaces when the trailer bytes are gone too
                        if pkt.bytes_available_from(base + payload_len) >= trailer {
                            warn!(ethertype = etype, "sub-dissector failed: {err}");
                            sink.note("payload.subprotocol_error", base + 4, err.to_string());
                        } else {
                            return Err(DissectError::SubProtocol {
                                ethertype: etype,
                                source: err,
                            });
                        }
                    }
                }
                pkt.set_offset(base + payload_len);
                pkt.consume_budget(payload_len)?;
                return self.emit_trailer(pkt, sink, has_grh);
            }
        }

        // opaque payload
        let base = pkt.offset();
        let avail = pkt.bytes_available_from(base);
        if avail < payload_len {
            if avail > 0 {
                let blob = pkt.slice(base, avail)?;
                emit_opaque("payload.data", blob, base, sink);
            }
            return Err(DissectError::TruncatedBuffer {
                offset: base,
                need: payload_len,
                have: avail,
            });
        }
        let blob = pkt.read_bytes(payload_len)?;
        emit_opaque("payload.data", blob, base, sink);
        pkt.consume_budget(payload_len)?;
        self.emit_trailer(pkt, sink, has_grh)
    }

    /// Raw IPv6 link frames go straight to the IPv6 registrant.
    fn dispatch_raw_ipv6(&self, pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
        let trailer = TrailerKind::VcrcOnly.size();
        let residual = pkt.budget();
        if residual < trailer {
            return Err(DissectError::MalformedPacket {
                offset: pkt.offset(),
                reason: "residual length cannot cover the CRC trailer",
            });
        }
        let payload_len = residual - trailer;
        let base = pkt.offset();
        let avail = pkt.bytes_available_from(base).min(payload_len);
        let sub = pkt.slice(base, avail)?;
        match self.ethertypes.dissect(ethertype::IPV6, sub.clone(), base, sink) {
            None => emit_opaque("payload.data", sub, base, sink),
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!("raw IPv6 payload failed to decode: {err}");
                sink.note("payload.subprotocol_error", base, err.to_string());
            }
        }
        pkt.set_offset(base + payload_len);
        pkt.consume_budget(payload_len)?;
        self.emit_trailer(pkt, sink, false)
    }

    /// Opaque remainder (raw link frames and vendor opcodes).
    fn dispatch_opaque(
        &self,
        pkt: &mut PktView,
        sink: &mut FieldSink,
        kind: TrailerKind,
        has_grh: bool,
    ) -> Result<(), DissectError> {
        let trailer = kind.size();
        let residual = pkt.budget();
        if residual < trailer {
            return Err(DissectError::MalformedPacket {
                offset: pkt.offset(),
                reason: "residual length cannot cover the CRC trailer",
            });
        }
        let payload_len = residual - trailer;
        if payload_len > 0 {
            let base = pkt.offset();
            let blob = pkt.read_bytes(payload_len)?;
            emit_opaque("payload.data", blob, base, sink);
            pkt.consume_budget(payload_len)?;
        }
        self.emit_trailer(pkt, sink, has_grh)
    }

    /// Sequences that end at the extended headers (RDMA read request,
    /// plain acknowledge, atomics) must leave exactly the trailer.
    fn finish_without_payload(
        &self,
        pkt: &mut PktView,
        sink: &mut FieldSink,
        has_grh: bool,
    ) -> Result<(), DissectError> {
        let residual = pkt.budget();
        if residual > TrailerKind::IcrcVcrc.size() {
            let extra = residual - TrailerKind::IcrcVcrc.size();
            warn!(extra, "trailing bytes on a sequence with no payload");
            sink.note(
                "payload.unexpected",
                pkt.offset(),
                format!("{extra} unexpected bytes before CRC trailer"),
            );
            let base = pkt.offset();
            let blob = pkt.read_bytes(extra)?;
            emit_opaque("payload.data", blob, base, sink);
            pkt.consume_budget(extra)?;
        }
        self.emit_trailer(pkt, sink, has_grh)
    }

    /// Emit whichever CRC trailer the residual budget leaves room for:
    /// 6 (ICRC + VCRC), 4 (ICRC only) or 2 (VCRC only). The invariant
    /// CRC is verified against the captured bytes when present.
    fn emit_trailer(
        &self,
        pkt: &mut PktView,
        sink: &mut FieldSink,
        has_grh: bool,
    ) -> Result<(), DissectError> {
        let residual = pkt.budget();
        match residual {
            6 | 4 => {
                let base = pkt.offset();
                let raw = pkt.read_bytes(IB_ICRC_SIZE)?;
                let icrc = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                sink.put_u32("trailer.icrc", base, icrc);
                pkt.consume_budget(IB_ICRC_SIZE)?;
                if let Ok(covered) = pkt.slice(0, base) {
                    if !verify_icrc(&covered, has_grh, icrc) {
                        sink.note("trailer.icrc_bad", base, "invariant CRC mismatch".to_string());
                    }
                }
                if residual == 6 {
                    let base = pkt.offset();
                    sink.put_u16("trailer.vcrc", base, pkt.read_u16()?);
                    pkt.consume_budget(IB_VCRC_SIZE)?;
                }
            }
            2 => {
                let base = pkt.offset();
                sink.put_u16("trailer.vcrc", base, pkt.read_u16()?);
                pkt.consume_budget(IB_VCRC_SIZE)?;
            }
            0 => {}
            other => {
                warn!(residual = other, "residual length is not a CRC trailer size");
                sink.note(
                    "trailer.malformed",
                    pkt.offset(),
                    format!("residual {other} bytes is not a valid CRC trailer"),
                );
            }
        }
        Ok(())
    }
}
