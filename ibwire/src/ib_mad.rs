use bytes::Bytes;
use tracing::{debug, warn};

use crate::ib_error::DissectError;
use crate::ib_field::FieldSink;
use crate::ib_pkt::PktView;
use crate::ib_rmpp::IbRmpp;
use crate::ib_sa::{self, SaHeader};
use crate::ib_schema::IbSchema;
use crate::ib_smp;

/// Management Datagram envelope: a fixed 256-byte window carried on the
/// management virtual lane, holding a 24-byte common header and 232
/// bytes of class-specific data.

pub const MAD_BYTES: usize = 256;
pub const MAD_HEADER_BYTES: usize = 24;
pub const MAD_DATA_BYTES: usize = 232;

pub mod mgmt_class {
    pub type Type = u8;
    pub const SUBN_LID_ROUTED: Type = 0x01;
    pub const SUBNADMN: Type = 0x03;
    pub const PERF: Type = 0x04;
    pub const BM: Type = 0x05;
    pub const DEV_MGT: Type = 0x06;
    pub const COM_MGT: Type = 0x07;
    pub const SNMP: Type = 0x08;
    pub const SUBN_DIRECTED_ROUTE: Type = 0x81;
}

/// Coarse routing of the management class space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtClassBucket {
    Normal,
    VendorSpecific,
    ApplicationSpecific,
    Reserved,
}

pub fn class_bucket(class: u8) -> MgmtClassBucket {
    use mgmt_class::*;
    match class {
        SUBN_LID_ROUTED | SUBNADMN | PERF | BM | DEV_MGT | COM_MGT | SNMP
        | SUBN_DIRECTED_ROUTE => MgmtClassBucket::Normal,
        0x09..=0x0F | 0x30..=0x4F => MgmtClassBucket::VendorSpecific,
        0x10..=0x2F => MgmtClassBucket::ApplicationSpecific,
        _ => MgmtClassBucket::Reserved,
    }
}

/// Common MAD header plus the class-specific data window, read-only
/// after creation and scoped to one packet.
#[derive(Debug, Clone)]
pub struct MadData {
    pub base_version: u8,
    pub management_class: u8,
    pub class_version: u8,
    pub method: u8,
    pub status: u16,
    pub class_specific: u16,
    pub transaction_id: u64,
    pub attribute_id: u16,
    pub attribute_modifier: u32,
    /// 232-byte class payload at `data_offset` in the packet
    pub data: Bytes,
    pub data_offset: usize,
}

/// Decode one 256-byte Management Datagram at the current offset and
/// dispatch the class-specific remainder. The window is charged against
/// the length budget in one piece; inner decoders only bounds-check.
pub fn parse_mad(
    schema: &IbSchema,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<MadData, DissectError> {
    let base = pkt.offset();
    pkt.require(MAD_BYTES)?;
    pkt.consume_budget(MAD_BYTES)?;

    let base_version = pkt.read_u8()?;
    let management_class = pkt.read_u8()?;
    let class_version = pkt.read_u8()?;
    let method = pkt.read_u8()?;
    let directed = management_class == mgmt_class::SUBN_DIRECTED_ROUTE;

    sink.put_u8("mad.base_version", base, base_version);
    sink.put_u8("mad.mgmt_class", base + 1, management_class);
    sink.put_text(
        "mad.mgmt_class_name",
        base + 1,
        1,
        schema.mgmt_class_name(management_class).to_string(),
    );
    sink.put_u8("mad.class_version", base + 2, class_version);
    sink.put_u8("mad.method", base + 3, method);

    let status = pkt.read_u16()?;
    let class_specific = pkt.read_u16()?;
    if directed {
        // directed-route SMPs repurpose these slots: D bit + status,
        // then hop pointer / hop count
        sink.put_flag("mad.dr.d", base + 4, 2, status & 0x8000 != 0);
        sink.put_u16("mad.dr.status", base + 4, status & 0x7FFF);
        sink.put_u8("mad.dr.hop_pointer", base + 6, (class_specific >> 8) as u8);
        sink.put_u8("mad.dr.hop_count", base + 7, (class_specific & 0xFF) as u8);
    } else {
        sink.put_u16("mad.status", base + 4, status);
        sink.put_u16("mad.class_specific", base + 6, class_specific);
    }

    let transaction_id = pkt.read_u64()?;
    sink.put_u64("mad.transaction_id", base + 8, transaction_id);
    let attribute_id = pkt.read_u16()?;
    sink.put_u16("mad.attribute_id", base + 16, attribute_id);
    pkt.advance(2)?; // reserved
    let attribute_modifier = pkt.read_u32()?;
    sink.put_u32("mad.attribute_modifier", base + 20, attribute_modifier);

    let mad = MadData {
        base_version,
        management_class,
        class_version,
        method,
        status,
        class_specific,
        transaction_id,
        attribute_id,
        attribute_modifier,
        data: pkt.slice(base + MAD_HEADER_BYTES, MAD_DATA_BYTES)?,
        data_offset: base + MAD_HEADER_BYTES,
    };
    debug!(
        class = management_class,
        attribute = attribute_id,
        "management datagram"
    );

    match class_bucket(management_class) {
        MgmtClassBucket::Normal => match management_class {
            mgmt_class::SUBN_LID_ROUTED => parse_subn_lid_routed(schema, &mad, pkt, sink)?,
            mgmt_class::SUBN_DIRECTED_ROUTE => parse_subn_directed_route(schema, &mad, pkt, sink)?,
            mgmt_class::SUBNADMN => parse_subnadmn(schema, &mad, pkt, sink)?,
            _ => {
                // PERF, BM, DEV_MGT, COM_MGT, SNMP: no deep decoder,
                // surface the class payload whole
                let blob = pkt.read_bytes(MAD_DATA_BYTES)?;
                sink.put_bytes("mad.class_data", mad.data_offset, blob);
            }
        },
        MgmtClassBucket::VendorSpecific => {
            let blob = pkt.read_bytes(MAD_DATA_BYTES)?;
            sink.put_bytes("mad.vendor_data", mad.data_offset, blob);
        }
        MgmtClassBucket::ApplicationSpecific => {
            let blob = pkt.read_bytes(MAD_DATA_BYTES)?;
            sink.put_bytes("mad.application_data", mad.data_offset, blob);
        }
        MgmtClassBucket::Reserved => {
            warn!(
                class = management_class,
                "reserved management class; possible device error"
            );
            sink.note(
                "mad.reserved_class",
                base + 1,
                format!(
                    "reserved management class {:#04x}; possible device error",
                    management_class
                ),
            );
            let blob = pkt.read_bytes(MAD_DATA_BYTES)?;
            sink.put_bytes("mad.class_data", mad.data_offset, blob);
        }
    }
    // every branch above lands here having consumed the full window
    pkt.set_offset(base + MAD_BYTES);
    Ok(mad)
}

/// LID-routed SMP: M_Key, 32 reserved bytes, the 64-byte attribute
/// block, then 128 reserved bytes.
fn parse_subn_lid_routed(
    schema: &IbSchema,
    mad: &MadData,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    sink.put_u64("smp.m_key", base, pkt.read_u64()?);
    pkt.advance(32)?;
    sink.put_text(
        "smp.attribute_name",
        base + 40,
        0,
        schema.smp_attr_name(mad.attribute_id).to_string(),
    );
    ib_smp::parse_attribute(schema, mad.attribute_id, pkt, sink)?;
    pkt.advance(128)?;
    Ok(())
}

/// Directed-route SMP: M_Key, DrSLID/DrDLID, the attribute block, then
/// the initial and return path vectors.
fn parse_subn_directed_route(
    schema: &IbSchema,
    mad: &MadData,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    sink.put_u64("smp.m_key", base, pkt.read_u64()?);
    sink.put_u16("smp.dr_slid", base + 8, pkt.read_u16()?);
    sink.put_u16("smp.dr_dlid", base + 10, pkt.read_u16()?);
    pkt.advance(28)?;
    sink.put_text(
        "smp.attribute_name",
        base + 40,
        0,
        schema.smp_attr_name(mad.attribute_id).to_string(),
    );
    ib_smp::parse_attribute(schema, mad.attribute_id, pkt, sink)?;
    let path_base = pkt.offset();
    let initial = pkt.read_bytes(64)?;
    sink.put_bytes("smp.initial_path", path_base, initial);
    let ret = pkt.read_bytes(64)?;
    sink.put_bytes("smp.return_path", path_base + 64, ret);
    Ok(())
}

/// Subnet Administration: RMPP segment header, SA header, then the
/// RID-prefixed record in the 200-byte data window.
fn parse_subnadmn(
    schema: &IbSchema,
    mad: &MadData,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let _rmpp: IbRmpp = IbRmpp::parse(schema, pkt, sink)?;
    let _sa_hdr: SaHeader = SaHeader::parse(pkt, sink)?;
    sink.put_text(
        "sa.attribute_name",
        pkt.offset(),
        0,
        schema.sa_attr_name(mad.attribute_id).to_string(),
    );
    ib_sa::parse_attribute(schema, mad.attribute_id, pkt, sink)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ib_field::FieldValue;
    use crate::ib_rmpp::rmpp_type;

    fn mad_window(class: u8, method: u8, attribute_id: u16, data: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(MAD_BYTES);
        raw.push(0x01); // base version
        raw.push(class);
        raw.push(0x01); // class version
        raw.push(method);
        raw.extend_from_slice(&[0x00, 0x00]); // status
        raw.extend_from_slice(&[0x00, 0x00]); // class specific
        raw.extend_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
        raw.extend_from_slice(&attribute_id.to_be_bytes());
        raw.extend_from_slice(&[0x00, 0x00]); // reserved
        raw.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // attribute modifier
        raw.extend_from_slice(data);
        raw.resize(MAD_BYTES, 0);
        raw
    }

    fn decode(raw: Vec<u8>) -> (MadData, FieldSink) {
        let schema = IbSchema::new();
        let mut pkt = PktView::new(Bytes::from(raw));
        pkt.seed_budget(MAD_BYTES);
        let mut sink = FieldSink::new();
        let mad = parse_mad(&schema, &mut pkt, &mut sink).unwrap();
        assert_eq!(pkt.offset(), MAD_BYTES);
        assert_eq!(pkt.budget(), 0);
        (mad, sink)
    }

    #[test]
    fn check_buckets() {
        assert_eq!(class_bucket(0x01), MgmtClassBucket::Normal);
        assert_eq!(class_bucket(0x81), MgmtClassBucket::Normal);
        assert_eq!(class_bucket(0x09), MgmtClassBucket::VendorSpecific);
        assert_eq!(class_bucket(0x4F), MgmtClassBucket::VendorSpecific);
        assert_eq!(class_bucket(0x10), MgmtClassBucket::ApplicationSpecific);
        assert_eq!(class_bucket(0x00), MgmtClassBucket::Reserved);
        assert_eq!(class_bucket(0x02), MgmtClassBucket::Reserved);
        assert_eq!(class_bucket(0x50), MgmtClassBucket::Reserved);
        assert_eq!(class_bucket(0x80), MgmtClassBucket::Reserved);
        assert_eq!(class_bucket(0x82), MgmtClassBucket::Reserved);
        assert_eq!(class_bucket(0xFF), MgmtClassBucket::Reserved);
    }

    #[test]
    fn check_lid_routed_node_info() {
        // NodeInfo record sits at the fixed attribute block offset:
        // 8 bytes M_Key + 32 reserved
        let mut data = vec![0u8; 40];
        data.extend_from_slice(&[0x01, 0x01, 0x01, 0x02]); // CA, 2 ports
        let raw = mad_window(mgmt_class::SUBN_LID_ROUTED, 0x01, 0x0011, &data);
        let (mad, sink) = decode(raw);
        assert_eq!(mad.management_class, mgmt_class::SUBN_LID_ROUTED);
        assert_eq!(mad.attribute_id, 0x0011);
        assert_eq!(mad.transaction_id, 0x1122_3344_5566_7788);
        // attribute block = 24 header + 8 m_key + 32 reserved
        assert_eq!(sink.find("nodeinfo.base_version").unwrap().offset, 64);
        assert_eq!(
            sink.find("smp.attribute_name").unwrap().value,
            FieldValue::Text("NodeInfo".into())
        );
    }

    #[test]
    fn check_directed_route_status_split() {
        let mut raw = mad_window(mgmt_class::SUBN_DIRECTED_ROUTE, 0x01, 0x0015, &[0u8; 0]);
        raw[4] = 0x80; // D bit
        raw[6] = 0x02; // hop pointer
        raw[7] = 0x05; // hop count
        let (_, sink) = decode(raw);
        assert_eq!(sink.find("mad.dr.d").unwrap().value, FieldValue::Flag(true));
        assert_eq!(sink.find("mad.dr.hop_pointer").unwrap().value, FieldValue::U8(2));
        assert_eq!(sink.find("mad.dr.hop_count").unwrap().value, FieldValue::U8(5));
        assert!(sink.find("smp.initial_path").is_some());
        assert!(sink.find("smp.return_path").is_some());
    }

    #[test]
    fn check_subnadmn_rmpp_then_rid_then_record() {
        let mut data = Vec::new();
        // RMPP data segment
        data.push(0x01);
        data.push(rmpp_type::DATA);
        data.push(0x00);
        data.push(0x00);
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&200u32.to_be_bytes());
        // SA header
        data.extend_from_slice(&0u64.to_be_bytes()); // sm_key
        data.extend_from_slice(&[0x00, 0x08]); // attribute offset
        data.extend_from_slice(&[0x00, 0x00]);
        data.extend_from_slice(&0u64.to_be_bytes()); // component mask
        // RID for NodeRecord: LID 3 + reserved
        data.extend_from_slice(&[0x00, 0x03, 0x00, 0x00]);
        let raw = mad_window(mgmt_class::SUBNADMN, 0x81, 0x0011, &data);
        let (_, sink) = decode(raw);
        assert!(sink.find("rmpp.segment_number").is_some());
        assert!(sink.find("sa.sm_key").is_some());
        assert_eq!(sink.find("sa.rid.lid").unwrap().value, FieldValue::U16(3));
        // SA data window opens after 24 + 12 + 20 bytes
        assert_eq!(sink.find("sa.rid.lid").unwrap().offset, 56);
        assert_eq!(sink.find("nodeinfo.base_version").unwrap().offset, 60);
    }

    #[test]
    fn check_reserved_class_consumes_window() {
        let raw = mad_window(0x50, 0x01, 0x0000, &[0xAA; 8]);
        let (mad, sink) = decode(raw);
        assert_eq!(mad.management_class, 0x50);
        assert!(sink.find("mad.reserved_class").is_some());
        let blob = sink.find("mad.class_data").unwrap();
        assert_eq!(blob.offset, MAD_HEADER_BYTES);
        assert_eq!(blob.len, MAD_DATA_BYTES);
    }

    #[test]
    fn check_truncated_mad_window() {
        let schema = IbSchema::new();
        let mut pkt = PktView::new(Bytes::from(vec![0u8; 100]));
        pkt.seed_budget(256);
        let mut sink = FieldSink::new();
        assert!(matches!(
            parse_mad(&schema, &mut pkt, &mut sink),
            Err(DissectError::TruncatedBuffer { need: 256, .. })
        ));
        assert!(sink.is_empty());
    }
}
