use crate::ib_error::DissectError;
use crate::ib_field::FieldSink;
use crate::ib_pkt::PktView;
use crate::ib_schema::IbSchema;
use crate::ib_smp;

/// Subnet Administration attributes. Each record is prefixed by a RID
/// (record identifier) whose shape also depends on the attribute ID,
/// then a fixed-layout body inside the 200-byte SA data window.

pub const SA_DATA_BYTES: usize = 200;
pub const SA_HEADER_BYTES: usize = 20;

pub mod sa_attr {
    pub type Type = u16;
    pub const CLASS_PORT_INFO: Type = 0x0001;
    pub const NOTICE: Type = 0x0002;
    pub const INFORM_INFO: Type = 0x0003;
    pub const NODE_RECORD: Type = 0x0011;
    pub const PORT_INFO_RECORD: Type = 0x0012;
    pub const SL_TO_VL_MAPPING_TABLE_RECORD: Type = 0x0013;
    pub const SWITCH_INFO_RECORD: Type = 0x0014;
    pub const LINEAR_FORWARDING_TABLE_RECORD: Type = 0x0015;
    pub const RANDOM_FORWARDING_TABLE_RECORD: Type = 0x0016;
    pub const MULTICAST_FORWARDING_TABLE_RECORD: Type = 0x0017;
    pub const SM_INFO_RECORD: Type = 0x0018;
    pub const LINK_RECORD: Type = 0x0020;
    pub const GUID_INFO_RECORD: Type = 0x0030;
    pub const SERVICE_RECORD: Type = 0x0031;
    pub const P_KEY_TABLE_RECORD: Type = 0x0033;
    pub const PATH_RECORD: Type = 0x0035;
    pub const VL_ARBITRATION_TABLE_RECORD: Type = 0x0036;
    pub const MC_MEMBER_RECORD: Type = 0x0038;
    pub const TRACE_RECORD: Type = 0x0039;
    pub const MULTI_PATH_RECORD: Type = 0x003A;
    pub const SERVICE_ASSOCIATION_RECORD: Type = 0x003B;
    pub const INFORM_INFO_RECORD: Type = 0x00F3;
}

/// SA-specific header following the RMPP segment header: SM_Key,
/// attribute offset, component mask.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaHeader {
    pub sm_key: u64,
    pub attribute_offset: u16,
    pub component_mask: u64,
}

impl SaHeader {
    pub fn parse(pkt: &mut PktView, sink: &mut FieldSink) -> Result<Self, DissectError> {
        let base = pkt.offset();
        pkt.require(SA_HEADER_BYTES)?;
        let sm_key = pkt.read_u64()?;
        let attribute_offset = pkt.read_u16()?;
        pkt.advance(2)?; // reserved
        let component_mask = pkt.read_u64()?;
        sink.put_u64("sa.sm_key", base, sm_key);
        sink.put_u16("sa.attribute_offset", base + 8, attribute_offset);
        sink.put_u64("sa.component_mask", base + 12, component_mask);
        Ok(SaHeader {
            sm_key,
            attribute_offset,
            component_mask,
        })
    }
}

/// Decode the RID prefix for `attribute_id`. The shapes are LID-only,
/// LID+port, LID+two-port and LID+block-number (8/9/16-bit blocks);
/// GID-keyed records (MCMember, Trace, MultiPath, Path, ...) carry
/// their keys inside the record body and have no separate RID.
pub fn parse_rid(
    attribute_id: u16,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    match attribute_id {
        sa_attr::NODE_RECORD | sa_attr::SWITCH_INFO_RECORD | sa_attr::SM_INFO_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            pkt.advance(2)?;
        }
        sa_attr::PORT_INFO_RECORD => {
            sink.put_u16("sa.rid.endport_lid", base, pkt.read_u16()?);
            sink.put_u8("sa.rid.port_num", base + 2, pkt.read_u8()?);
            pkt.advance(1)?;
        }
        sa_attr::SL_TO_VL_MAPPING_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            sink.put_u8("sa.rid.input_port_num", base + 2, pkt.read_u8()?);
            sink.put_u8("sa.rid.output_port_num", base + 3, pkt.read_u8()?);
            pkt.advance(4)?;
        }
        sa_attr::LINEAR_FORWARDING_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            sink.put_u16("sa.rid.block_num", base + 2, pkt.read_u16()?);
            pkt.advance(4)?;
        }
        sa_attr::RANDOM_FORWARDING_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            // 9-bit block number in the low bits of the word
            sink.put_u16("sa.rid.block_num", base + 2, pkt.read_u16()? & 0x01FF);
            pkt.advance(4)?;
        }
        sa_attr::MULTICAST_FORWARDING_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            let word = pkt.read_u16()?;
            sink.put_u8("sa.rid.position", base + 2, ((word & 0xF000) >> 12) as u8);
            sink.put_u16("sa.rid.block_num", base + 2, word & 0x01FF);
            pkt.advance(4)?;
        }
        sa_attr::GUID_INFO_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            sink.put_u8("sa.rid.block_num", base + 2, pkt.read_u8()?);
            pkt.advance(5)?;
        }
        sa_attr::P_KEY_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            sink.put_u16("sa.rid.block_num", base + 2, pkt.read_u16()?);
            sink.put_u8("sa.rid.port_num", base + 4, pkt.read_u8()?);
            pkt.advance(3)?;
        }
        sa_attr::VL_ARBITRATION_TABLE_RECORD => {
            sink.put_u16("sa.rid.lid", base, pkt.read_u16()?);
            sink.put_u8("sa.rid.output_port_num", base + 2, pkt.read_u8()?);
            sink.put_u8("sa.rid.block_num", base + 3, pkt.read_u8()?);
            pkt.advance(4)?;
        }
        sa_attr::LINK_RECORD => {
            sink.put_u16("sa.rid.from_lid", base, pkt.read_u16()?);
            sink.put_u8("sa.rid.from_port", base + 2, pkt.read_u8()?);
        }
        sa_attr::SERVICE_RECORD => {
            sink.put_u64("sa.rid.service_id", base, pkt.read_u64()?);
            sink.put_gid("sa.rid.service_gid", base + 8, pkt.read_gid()?);
            sink.put_u16("sa.rid.service_pkey", base + 24, pkt.read_u16()?);
            pkt.advance(2)?;
        }
        sa_attr::INFORM_INFO_RECORD => {
            sink.put_gid("sa.rid.subscriber_gid", base, pkt.read_gid()?);
            sink.put_u16("sa.rid.enum", base + 16, pkt.read_u16()?);
            pkt.advance(6)?;
        }
        _ => {}
    }
    Ok(())
}

/// Decode the SA record selected by `attribute_id` inside the 200-byte
/// data window at the current offset. Unknown attribute IDs fall back
/// to an opaque blob. The cursor always lands on `window + 200`.
pub fn parse_attribute(
    schema: &IbSchema,
    attribute_id: u16,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let window = pkt.offset();
    pkt.require(SA_DATA_BYTES)?;
    parse_rid(attribute_id, pkt, sink)?;
    match attribute_id {
        sa_attr::CLASS_PORT_INFO => parse_class_port_info(pkt, sink)?,
        sa_attr::NOTICE => parse_notice(pkt, sink)?,
        sa_attr::INFORM_INFO | sa_attr::INFORM_INFO_RECORD => parse_inform_info(pkt, sink)?,
        sa_attr::NODE_RECORD => {
            ib_smp::parse_node_info(schema, pkt, sink)?;
            ib_smp::parse_node_description(pkt, sink)?;
        }
        sa_attr::PORT_INFO_RECORD => ib_smp::parse_port_info(pkt, sink)?,
        sa_attr::SL_TO_VL_MAPPING_TABLE_RECORD => ib_smp::parse_sl_to_vl_table(pkt, sink)?,
        sa_attr::SWITCH_INFO_RECORD => ib_smp::parse_switch_info(pkt, sink)?,
        sa_attr::LINEAR_FORWARDING_TABLE_RECORD => ib_smp::parse_linear_forwarding_table(pkt, sink)?,
        sa_attr::RANDOM_FORWARDING_TABLE_RECORD => ib_smp::parse_random_forwarding_table(pkt, sink)?,
        sa_attr::MULTICAST_FORWARDING_TABLE_RECORD => {
            ib_smp::parse_multicast_forwarding_table(pkt, sink)?
        }
        sa_attr::SM_INFO_RECORD => ib_smp::parse_sm_info(pkt, sink)?,
        sa_attr::GUID_INFO_RECORD => ib_smp::parse_guid_info(pkt, sink)?,
        sa_attr::P_KEY_TABLE_RECORD => ib_smp::parse_pkey_table(pkt, sink)?,
        sa_attr::VL_ARBITRATION_TABLE_RECORD => ib_smp::parse_vl_arbitration_table(pkt, sink)?,
        sa_attr::LINK_RECORD => {
            let base = pkt.offset();
            sink.put_u8("linkrecord.to_port", base, pkt.read_u8()?);
            sink.put_u16("linkrecord.to_lid", base + 1, pkt.read_u16()?);
        }
        sa_attr::SERVICE_RECORD => parse_service_record_body(pkt, sink)?,
        sa_attr::PATH_RECORD => parse_path_record(pkt, sink)?,
        sa_attr::MC_MEMBER_RECORD => parse_mc_member_record(pkt, sink)?,
        sa_attr::TRACE_RECORD => parse_trace_record(schema, pkt, sink)?,
        sa_attr::MULTI_PATH_RECORD => parse_multi_path_record(pkt, sink)?,
        sa_attr::SERVICE_ASSOCIATION_RECORD => parse_service_association_record(pkt, sink)?,
        _ => {
            let blob = pkt.read_bytes(SA_DATA_BYTES)?;
            sink.put_bytes("sa.unknown_attribute", window, blob);
        }
    }
    pkt.set_offset(window + SA_DATA_BYTES);
    Ok(())
}

fn parse_class_port_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(72)?;
    sink.put_u8("classportinfo.base_version", base, pkt.read_u8()?);
    sink.put_u8("classportinfo.class_version", base + 1, pkt.read_u8()?);
    sink.put_u16("classportinfo.capability_mask", base + 2, pkt.read_u16()?);
    let word = pkt.read_u32()?;
    sink.put_u32("classportinfo.capability_mask2", base + 4, word >> 5);
    sink.put_u8("classportinfo.resp_time_value", base + 4, (word & 0x1F) as u8);
    sink.put_gid("classportinfo.redirect_gid", base + 8, pkt.read_gid()?);
    let word = pkt.read_u32()?;
    sink.put_u8("classportinfo.redirect_tclass", base + 24, (word >> 24) as u8);
    sink.put_u8("classportinfo.redirect_sl", base + 24, ((word >> 20) & 0xF) as u8);
    sink.put_u32("classportinfo.redirect_flow_label", base + 24, word & 0x000F_FFFF);
    sink.put_u16("classportinfo.redirect_lid", base + 28, pkt.read_u16()?);
    sink.put_u16("classportinfo.redirect_pkey", base + 30, pkt.read_u16()?);
    sink.put_u24("classportinfo.redirect_qp", base + 33, pkt.read_u32()? & 0x00FF_FFFF);
    sink.put_u32("classportinfo.redirect_qkey", base + 36, pkt.read_u32()?);
    sink.put_gid("classportinfo.trap_gid", base + 40, pkt.read_gid()?);
    let word = pkt.read_u32()?;
    sink.put_u8("classportinfo.trap_tclass", base + 56, (word >> 24) as u8);
    sink.put_u8("classportinfo.trap_sl", base + 56, ((word >> 20) & 0xF) as u8);
    sink.put_u32("classportinfo.trap_flow_label", base + 56, word & 0x000F_FFFF);
    sink.put_u16("classportinfo.trap_lid", base + 60, pkt.read_u16()?);
    sink.put_u16("classportinfo.trap_pkey", base + 62, pkt.read_u16()?);
    let word = pkt.read_u32()?;
    sink.put_u8("classportinfo.trap_hop_limit", base + 64, (word >> 24) as u8);
    sink.put_u24("classportinfo.trap_qp", base + 65, word & 0x00FF_FFFF);
    sink.put_u32("classportinfo.trap_qkey", base + 68, pkt.read_u32()?);
    Ok(())
}

fn parse_notice(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(80)?;
    let b = pkt.read_u8()?;
    sink.put_flag("notice.is_generic", base, 1, b & 0x80 != 0);
    sink.put_u8("notice.type", base, b & 0x7F);
    sink.put_u24("notice.producer_type", base + 1, pkt.read_u24()?);
    sink.put_u16("notice.trap_number", base + 4, pkt.read_u16()?);
    sink.put_u16("notice.issuer_lid", base + 6, pkt.read_u16()?);
    let word = pkt.read_u16()?;
    sink.put_flag("notice.toggle", base + 8, 1, word & 0x8000 != 0);
    sink.put_u16("notice.count", base + 8, word & 0x7FFF);
    let details = pkt.read_bytes(54)?;
    sink.put_bytes("notice.data_details", base + 10, details);
    sink.put_gid("notice.issuer_gid", base + 64, pkt.read_gid()?);
    Ok(())
}

/// 36-byte InformInfo (event subscription) record.
fn parse_inform_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(36)?;
    sink.put_gid("informinfo.gid", base, pkt.read_gid()?);
    sink.put_u16("informinfo.lid_range_begin", base + 16, pkt.read_u16()?);
    sink.put_u16("informinfo.lid_range_end", base + 18, pkt.read_u16()?);
    pkt.advance(2)?;
    sink.put_u8("informinfo.is_generic", base + 22, pkt.read_u8()?);
    sink.put_u8("informinfo.subscribe", base + 23, pkt.read_u8()?);
    sink.put_u16("informinfo.type", base + 24, pkt.read_u16()?);
    sink.put_u16("informinfo.trap_number", base + 26, pkt.read_u16()?);
    let word = pkt.read_u32()?;
    sink.put_u24("informinfo.qpn", base + 28, word >> 8);
    sink.put_u8("informinfo.resp_time_value", base + 31, (word & 0x1F) as u8);
    pkt.advance(1)?;
    sink.put_u24("informinfo.producer_type", base + 33, pkt.read_u24()?);
    Ok(())
}

fn parse_service_record_body(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(148)?;
    sink.put_u32("servicerecord.service_lease", base, pkt.read_u32()?);
    let key = pkt.read_bytes(16)?;
    sink.put_bytes("servicerecord.service_key", base + 4, key);
    let raw = pkt.read_bytes(64)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let name = String::from_utf8_lossy(&raw[..end]).into_owned();
    sink.put_text("servicerecord.service_name", base + 20, 64, name);
    let data = pkt.read_bytes(64)?;
    sink.put_bytes("servicerecord.service_data", base + 84, data);
    Ok(())
}

/// 64-byte PathRecord.
fn parse_path_record(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    pkt.advance(8)?; // reserved
    sink.put_gid("pathrecord.dgid", base + 8, pkt.read_gid()?);
    sink.put_gid("pathrecord.sgid", base + 24, pkt.read_gid()?);
    sink.put_u16("pathrecord.dlid", base + 40, pkt.read_u16()?);
    sink.put_u16("pathrecord.slid", base + 42, pkt.read_u16()?);
    let word = pkt.read_u32()?;
    sink.put_flag("pathrecord.raw_traffic", base + 44, 1, word & 0x8000_0000 != 0);
    sink.put_u32("pathrecord.flow_label", base + 44, (word >> 8) & 0x000F_FFFF);
    sink.put_u8("pathrecord.hop_limit", base + 47, (word & 0xFF) as u8);
    sink.put_u8("pathrecord.tclass", base + 48, pkt.read_u8()?);
    let b = pkt.read_u8()?;
    sink.put_flag("pathrecord.reversible", base + 49, 1, b & 0x80 != 0);
    sink.put_u8("pathrecord.numb_path", base + 49, b & 0x7F);
    sink.put_u16("pathrecord.pkey", base + 50, pkt.read_u16()?);
    let word = pkt.read_u16()?;
    sink.put_u8("pathrecord.sl", base + 52, (word & 0x000F) as u8);
    let b = pkt.read_u8()?;
    sink.put_u8("pathrecord.mtu_selector", base + 54, (b & 0xC0) >> 6);
    sink.put_u8("pathrecord.mtu", base + 54, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("pathrecord.rate_selector", base + 55, (b & 0xC0) >> 6);
    sink.put_u8("pathrecord.rate", base + 55, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("pathrecord.packet_life_time_selector", base + 56, (b & 0xC0) >> 6);
    sink.put_u8("pathrecord.packet_life_time", base + 56, b & 0x3F);
    sink.put_u8("pathrecord.preference", base + 57, pkt.read_u8()?);
    pkt.advance(6)?; // reserved
    Ok(())
}

/// 52-byte MCMemberRecord; the MGID/PortGID keys lead the body.
fn parse_mc_member_record(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(52)?;
    sink.put_gid("mcmemberrecord.mgid", base, pkt.read_gid()?);
    sink.put_gid("mcmemberrecord.port_gid", base + 16, pkt.read_gid()?);
    sink.put_u32("mcmemberrecord.qkey", base + 32, pkt.read_u32()?);
    sink.put_u16("mcmemberrecord.mlid", base + 36, pkt.read_u16()?);
    let b = pkt.read_u8()?;
    sink.put_u8("mcmemberrecord.mtu_selector", base + 38, (b & 0xC0) >> 6);
    sink.put_u8("mcmemberrecord.mtu", base + 38, b & 0x3F);
    sink.put_u8("mcmemberrecord.tclass", base + 39, pkt.read_u8()?);
    sink.put_u16("mcmemberrecord.pkey", base + 40, pkt.read_u16()?);
    let b = pkt.read_u8()?;
    sink.put_u8("mcmemberrecord.rate_selector", base + 42, (b & 0xC0) >> 6);
    sink.put_u8("mcmemberrecord.rate", base + 42, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("mcmemberrecord.packet_life_time_selector", base + 43, (b & 0xC0) >> 6);
    sink.put_u8("mcmemberrecord.packet_life_time", base + 43, b & 0x3F);
    let word = pkt.read_u32()?;
    sink.put_u8("mcmemberrecord.sl", base + 44, (word >> 28) as u8);
    sink.put_u32("mcmemberrecord.flow_label", base + 44, (word >> 8) & 0x000F_FFFF);
    sink.put_u8("mcmemberrecord.hop_limit", base + 47, (word & 0xFF) as u8);
    let b = pkt.read_u8()?;
    sink.put_u8("mcmemberrecord.scope", base + 48, (b & 0xF0) >> 4);
    sink.put_u8("mcmemberrecord.join_state", base + 48, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_flag("mcmemberrecord.proxy_join", base + 49, 1, b & 0x80 != 0);
    pkt.advance(2)?; // reserved
    Ok(())
}

/// 46-byte TraceRecord.
fn parse_trace_record(
    schema: &IbSchema,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(46)?;
    sink.put_u64("tracerecord.gid_prefix", base, pkt.read_u64()?);
    sink.put_u16("tracerecord.id_generation", base + 8, pkt.read_u16()?);
    pkt.advance(1)?;
    let node_type = pkt.read_u8()?;
    sink.put_u8("tracerecord.node_type", base + 11, node_type);
    sink.put_text(
        "tracerecord.node_type_name",
        base + 11,
        1,
        schema.node_type_name(node_type).to_string(),
    );
    sink.put_u64("tracerecord.node_id", base + 12, pkt.read_u64()?);
    sink.put_u64("tracerecord.chassis_id", base + 20, pkt.read_u64()?);
    sink.put_u64("tracerecord.entry_port_id", base + 28, pkt.read_u64()?);
    sink.put_u64("tracerecord.exit_port_id", base + 36, pkt.read_u64()?);
    sink.put_u8("tracerecord.entry_port", base + 44, pkt.read_u8()?);
    sink.put_u8("tracerecord.exit_port", base + 45, pkt.read_u8()?);
    Ok(())
}

fn parse_multi_path_record(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(40)?;
    let word = pkt.read_u32()?;
    sink.put_flag("multipathrecord.raw_traffic", base, 1, word & 0x8000_0000 != 0);
    sink.put_u32("multipathrecord.flow_label", base, (word >> 8) & 0x000F_FFFF);
    sink.put_u8("multipathrecord.hop_limit", base + 3, (word & 0xFF) as u8);
    sink.put_u8("multipathrecord.tclass", base + 4, pkt.read_u8()?);
    let b = pkt.read_u8()?;
    sink.put_flag("multipathrecord.reversible", base + 5, 1, b & 0x80 != 0);
    sink.put_u8("multipathrecord.numb_path", base + 5, b & 0x7F);
    sink.put_u16("multipathrecord.pkey", base + 6, pkt.read_u16()?);
    let word = pkt.read_u16()?;
    sink.put_u8("multipathrecord.sl", base + 8, (word & 0x000F) as u8);
    let b = pkt.read_u8()?;
    sink.put_u8("multipathrecord.mtu_selector", base + 10, (b & 0xC0) >> 6);
    sink.put_u8("multipathrecord.mtu", base + 10, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("multipathrecord.rate_selector", base + 11, (b & 0xC0) >> 6);
    sink.put_u8("multipathrecord.rate", base + 11, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("multipathrecord.packet_life_time_selector", base + 12, (b & 0xC0) >> 6);
    sink.put_u8("multipathrecord.packet_life_time", base + 12, b & 0x3F);
    let b = pkt.read_u8()?;
    sink.put_u8("multipathrecord.independence_selector", base + 13, (b & 0xC0) >> 6);
    sink.put_u8("multipathrecord.sgid_count", base + 14, pkt.read_u8()?);
    sink.put_u8("multipathrecord.dgid_count", base + 15, pkt.read_u8()?);
    pkt.advance(8)?; // reserved
    // first entry of the SDGID list; the full list is bounded by the
    // window and the declared counts
    sink.put_gid("multipathrecord.sdgid", base + 24, pkt.read_gid()?);
    Ok(())
}

fn parse_service_association_record(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(80)?;
    let key = pkt.read_bytes(16)?;
    sink.put_bytes("serviceassociationrecord.service_key", base, key);
    let raw = pkt.read_bytes(64)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let name = String::from_utf8_lossy(&raw[..end]).into_owned();
    sink.put_text("serviceassociationrecord.service_name", base + 16, 64, name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ib_field::FieldValue;
    use bytes::Bytes;

    fn window(record: &[u8]) -> PktView {
        let mut raw = record.to_vec();
        raw.resize(SA_DATA_BYTES, 0);
        PktView::new(Bytes::from(raw))
    }

    #[test]
    fn check_node_record_rid_then_body() {
        let mut raw = vec![0x00, 0x09, 0x00, 0x00]; // RID: LID 9
        raw.extend_from_slice(&[0x01, 0x01, 0x01, 0x02]); // CA, 2 ports
        raw.resize(4 + 40, 0);
        raw.extend_from_slice(b"node-7");
        let schema = IbSchema::new();
        let mut pkt = window(&raw);
        let mut sink = FieldSink::new();
        parse_attribute(&schema, sa_attr::NODE_RECORD, &mut pkt, &mut sink).unwrap();
        assert_eq!(pkt.offset(), SA_DATA_BYTES);
        assert_eq!(sink.find("sa.rid.lid").unwrap().value, FieldValue::U16(9));
        // NodeInfo body begins after the 4-byte RID
        assert_eq!(sink.find("nodeinfo.base_version").unwrap().offset, 4);
        assert_eq!(
            sink.find("nodedescription.node_string").unwrap().value,
            FieldValue::Text("node-7".into())
        );
    }

    #[test]
    fn check_path_record_layout() {
        let mut raw = vec![0u8; 64];
        raw[8..24].copy_from_slice(&[0xD0; 16]);
        raw[24..40].copy_from_slice(&[0x50; 16]);
        raw[40] = 0x00;
        raw[41] = 0x12; // dlid
        raw[42] = 0x00;
        raw[43] = 0x34; // slid
        raw[49] = 0x81; // reversible, numbpath 1
        raw[52] = 0x00;
        raw[53] = 0x03; // sl 3
        let schema = IbSchema::new();
        let mut pkt = window(&raw);
        let mut sink = FieldSink::new();
        parse_attribute(&schema, sa_attr::PATH_RECORD, &mut pkt, &mut sink).unwrap();
        assert_eq!(sink.find("pathrecord.dgid").unwrap().value, FieldValue::Gid([0xD0; 16]));
        assert_eq!(sink.find("pathrecord.dlid").unwrap().value, FieldValue::U16(0x12));
        assert_eq!(sink.find("pathrecord.slid").unwrap().value, FieldValue::U16(0x34));
        assert_eq!(sink.find("pathrecord.reversible").unwrap().value, FieldValue::Flag(true));
        assert_eq!(sink.find("pathrecord.numb_path").unwrap().value, FieldValue::U8(1));
        assert_eq!(sink.find("pathrecord.sl").unwrap().value, FieldValue::U8(3));
    }

    #[test]
    fn check_mc_member_record_keys_in_body() {
        let mut raw = vec![0u8; 52];
        raw[0..16].copy_from_slice(&[0xFF; 16]);
        raw[16..32].copy_from_slice(&[0xEE; 16]);
        raw[48] = 0x25; // scope 2, join state 5
        let schema = IbSchema::new();
        let mut pkt = window(&raw);
        let mut sink = FieldSink::new();
        parse_attribute(&schema, sa_attr::MC_MEMBER_RECORD, &mut pkt, &mut sink).unwrap();
        assert_eq!(sink.find("mcmemberrecord.mgid").unwrap().offset, 0);
        assert_eq!(sink.find("mcmemberrecord.scope").unwrap().value, FieldValue::U8(2));
        assert_eq!(sink.find("mcmemberrecord.join_state").unwrap().value, FieldValue::U8(5));
    }

    #[test]
    fn check_rid_shapes() {
        // LID + two ports, 8 bytes total
        let schema = IbSchema::new();
        let mut raw = vec![0x00, 0x07, 0x01, 0x02];
        raw.resize(SA_DATA_BYTES, 0);
        let mut pkt = window(&raw);
        let mut sink = FieldSink::new();
        parse_attribute(
            &schema,
            sa_attr::SL_TO_VL_MAPPING_TABLE_RECORD,
            &mut pkt,
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink.find("sa.rid.input_port_num").unwrap().value, FieldValue::U8(1));
        assert_eq!(sink.find("sa.rid.output_port_num").unwrap().value, FieldValue::U8(2));
        // table body starts after the 8-byte RID
        assert_eq!(sink.find("sltovl.vl").unwrap().offset >= 8, true);
    }

    #[test]
    fn check_unknown_sa_attribute_is_opaque() {
        let schema = IbSchema::new();
        let mut pkt = window(&[0x55; 16]);
        let mut sink = FieldSink::new();
        parse_attribute(&schema, 0x0099, &mut pkt, &mut sink).unwrap();
        let rec = sink.find("sa.unknown_attribute").unwrap();
        assert_eq!(rec.len, SA_DATA_BYTES);
        assert_eq!(pkt.offset(), SA_DATA_BYTES);
    }
}
