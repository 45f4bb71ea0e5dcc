use bitflags::bitflags;

use crate::ib_error::DissectError;
use crate::ib_field::FieldSink;
use crate::ib_pkt::PktView;
use crate::ib_schema::IbSchema;

/// Subnet Management attributes: attribute-ID-keyed fixed-layout
/// records carried in the 64-byte SMP data block.

pub const SMP_DATA_BYTES: usize = 64;

pub mod smp_attr {
    pub type Type = u16;
    pub const NODE_DESCRIPTION: Type = 0x0010;
    pub const NODE_INFO: Type = 0x0011;
    pub const SWITCH_INFO: Type = 0x0012;
    pub const GUID_INFO: Type = 0x0014;
    pub const PORT_INFO: Type = 0x0015;
    pub const P_KEY_TABLE: Type = 0x0016;
    pub const SL_TO_VL_MAPPING_TABLE: Type = 0x0017;
    pub const VL_ARBITRATION_TABLE: Type = 0x0018;
    pub const LINEAR_FORWARDING_TABLE: Type = 0x0019;
    pub const RANDOM_FORWARDING_TABLE: Type = 0x001A;
    pub const MULTICAST_FORWARDING_TABLE: Type = 0x001B;
    pub const LINK_SPEED_WIDTH_PAIRS_TABLE: Type = 0x001C;
    pub const SM_INFO: Type = 0x0020;
    pub const VENDOR_DIAG: Type = 0x0030;
    pub const LED_INFO: Type = 0x0031;
}

bitflags! {
    /// PortInfo CapabilityMask. Bit 0 and bit 13 are reserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortCapabilityMask: u32 {
        const SM                                  = 1 << 1;
        const NOTICE_SUPPORTED                    = 1 << 2;
        const TRAP_SUPPORTED                      = 1 << 3;
        const OPTIONAL_IPD_SUPPORTED              = 1 << 4;
        const AUTOMATIC_MIGRATION_SUPPORTED       = 1 << 5;
        const SL_MAPPING_SUPPORTED                = 1 << 6;
        const MKEY_NVRAM                          = 1 << 7;
        const PKEY_NVRAM                          = 1 << 8;
        const LED_INFO_SUPPORTED                  = 1 << 9;
        const SM_DISABLED                         = 1 << 10;
        const SYSTEM_IMAGE_GUID_SUPPORTED         = 1 << 11;
        const PKEY_SWITCH_EXT_PORT_TRAP_SUPPORTED = 1 << 12;
        const EXTENDED_SPEEDS_SUPPORTED           = 1 << 14;
        const CAPABILITY_MASK2_SUPPORTED          = 1 << 15;
        const COMMUNICATION_MANAGEMENT_SUPPORTED  = 1 << 16;
        const SNMP_TUNNELING_SUPPORTED            = 1 << 17;
        const REINIT_SUPPORTED                    = 1 << 18;
        const DEVICE_MANAGEMENT_SUPPORTED         = 1 << 19;
        const VENDOR_CLASS_SUPPORTED              = 1 << 20;
        const DR_NOTICE_SUPPORTED                 = 1 << 21;
        const CAPABILITY_MASK_NOTICE_SUPPORTED    = 1 << 22;
        const BOOT_MANAGEMENT_SUPPORTED           = 1 << 23;
        const LINK_ROUND_TRIP_LATENCY_SUPPORTED   = 1 << 24;
        const CLIENT_REREGISTRATION_SUPPORTED     = 1 << 25;
        const OTHER_LOCAL_CHANGES_NOTICE_SUPPORTED = 1 << 26;
        const LINK_SPEED_WIDTH_PAIRS_TABLE_SUPPORTED = 1 << 27;
        const VENDOR_SPECIFIC_MADS_TABLE_SUPPORTED = 1 << 28;
        const MCAST_PKEY_TRAP_SUPPRESSION_SUPPORTED = 1 << 29;
    }
}

const CAP_FLAG_NAMES: &[(PortCapabilityMask, &str)] = &[
    (PortCapabilityMask::SM, "portinfo.cap.is_sm"),
    (PortCapabilityMask::NOTICE_SUPPORTED, "portinfo.cap.notice"),
    (PortCapabilityMask::TRAP_SUPPORTED, "portinfo.cap.trap"),
    (PortCapabilityMask::OPTIONAL_IPD_SUPPORTED, "portinfo.cap.optional_ipd"),
    (PortCapabilityMask::AUTOMATIC_MIGRATION_SUPPORTED, "portinfo.cap.auto_migration"),
    (PortCapabilityMask::SL_MAPPING_SUPPORTED, "portinfo.cap.sl_mapping"),
    (PortCapabilityMask::MKEY_NVRAM, "portinfo.cap.mkey_nvram"),
    (PortCapabilityMask::PKEY_NVRAM, "portinfo.cap.pkey_nvram"),
    (PortCapabilityMask::LED_INFO_SUPPORTED, "portinfo.cap.led_info"),
    (PortCapabilityMask::SM_DISABLED, "portinfo.cap.sm_disabled"),
    (PortCapabilityMask::SYSTEM_IMAGE_GUID_SUPPORTED, "portinfo.cap.sys_image_guid"),
    (PortCapabilityMask::PKEY_SWITCH_EXT_PORT_TRAP_SUPPORTED, "portinfo.cap.pkey_switch_ext_port_trap"),
    (PortCapabilityMask::EXTENDED_SPEEDS_SUPPORTED, "portinfo.cap.extended_speeds"),
    (PortCapabilityMask::CAPABILITY_MASK2_SUPPORTED, "portinfo.cap.cap_mask2"),
    (PortCapabilityMask::COMMUNICATION_MANAGEMENT_SUPPORTED, "portinfo.cap.comm_mgt"),
    (PortCapabilityMask::SNMP_TUNNELING_SUPPORTED, "portinfo.cap.snmp_tunneling"),
    (PortCapabilityMask::REINIT_SUPPORTED, "portinfo.cap.reinit"),
    (PortCapabilityMask::DEVICE_MANAGEMENT_SUPPORTED, "portinfo.cap.device_mgt"),
    (PortCapabilityMask::VENDOR_CLASS_SUPPORTED, "portinfo.cap.vendor_class"),
    (PortCapabilityMask::DR_NOTICE_SUPPORTED, "portinfo.cap.dr_notice"),
    (PortCapabilityMask::CAPABILITY_MASK_NOTICE_SUPPORTED, "portinfo.cap.cap_mask_notice"),
    (PortCapabilityMask::BOOT_MANAGEMENT_SUPPORTED, "portinfo.cap.boot_mgt"),
    (PortCapabilityMask::LINK_ROUND_TRIP_LATENCY_SUPPORTED, "portinfo.cap.link_rtt"),
    (PortCapabilityMask::CLIENT_REREGISTRATION_SUPPORTED, "portinfo.cap.client_rereg"),
    (PortCapabilityMask::OTHER_LOCAL_CHANGES_NOTICE_SUPPORTED, "portinfo.cap.other_local_changes"),
    (PortCapabilityMask::LINK_SPEED_WIDTH_PAIRS_TABLE_SUPPORTED, "portinfo.cap.link_speed_width_pairs"),
    (PortCapabilityMask::VENDOR_SPECIFIC_MADS_TABLE_SUPPORTED, "portinfo.cap.vendor_mads_table"),
    (PortCapabilityMask::MCAST_PKEY_TRAP_SUPPRESSION_SUPPORTED, "portinfo.cap.mcast_pkey_trap_suppression"),
];

/// Decode the attribute record selected by `attribute_id` inside a
/// 64-byte window starting at the current offset. Unknown attribute IDs
/// fall back to an opaque blob. The cursor always lands on
/// `window + 64` afterwards.
pub fn parse_attribute(
    schema: &IbSchema,
    attribute_id: u16,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let window = pkt.offset();
    pkt.require(SMP_DATA_BYTES)?;
    match attribute_id {
        smp_attr::NODE_DESCRIPTION => parse_node_description(pkt, sink)?,
        smp_attr::NODE_INFO => {
            parse_node_info(schema, pkt, sink)?;
        }
        smp_attr::SWITCH_INFO => parse_switch_info(pkt, sink)?,
        smp_attr::GUID_INFO => parse_guid_info(pkt, sink)?,
        smp_attr::PORT_INFO => parse_port_info(pkt, sink)?,
        smp_attr::P_KEY_TABLE => parse_pkey_table(pkt, sink)?,
        smp_attr::SL_TO_VL_MAPPING_TABLE => parse_sl_to_vl_table(pkt, sink)?,
        smp_attr::VL_ARBITRATION_TABLE => parse_vl_arbitration_table(pkt, sink)?,
        smp_attr::LINEAR_FORWARDING_TABLE => parse_linear_forwarding_table(pkt, sink)?,
        smp_attr::RANDOM_FORWARDING_TABLE => parse_random_forwarding_table(pkt, sink)?,
        smp_attr::MULTICAST_FORWARDING_TABLE => parse_multicast_forwarding_table(pkt, sink)?,
        smp_attr::LINK_SPEED_WIDTH_PAIRS_TABLE => parse_link_speed_width_pairs_table(pkt, sink)?,
        smp_attr::SM_INFO => parse_sm_info(pkt, sink)?,
        smp_attr::VENDOR_DIAG => parse_vendor_diag(pkt, sink)?,
        smp_attr::LED_INFO => parse_led_info(pkt, sink)?,
        _ => {
            let blob = pkt.read_bytes(SMP_DATA_BYTES)?;
            sink.put_bytes("smp.unknown_attribute", window, blob);
        }
    }
    pkt.set_offset(window + SMP_DATA_BYTES);
    Ok(())
}

pub(crate) fn parse_node_description(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    let raw = pkt.read_bytes(64)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]).into_owned();
    sink.put_text("nodedescription.node_string", base, 64, text);
    Ok(())
}

/// 40-byte NodeInfo record.
pub(crate) fn parse_node_info(
    schema: &IbSchema,
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(40)?;
    sink.put_u8("nodeinfo.base_version", base, pkt.read_u8()?);
    sink.put_u8("nodeinfo.class_version", base + 1, pkt.read_u8()?);
    let node_type = pkt.read_u8()?;
    sink.put_u8("nodeinfo.node_type", base + 2, node_type);
    sink.put_text(
        "nodeinfo.node_type_name",
        base + 2,
        1,
        schema.node_type_name(node_type).to_string(),
    );
    sink.put_u8("nodeinfo.num_ports", base + 3, pkt.read_u8()?);
    sink.put_u64("nodeinfo.system_image_guid", base + 4, pkt.read_u64()?);
    sink.put_u64("nodeinfo.node_guid", base + 12, pkt.read_u64()?);
    sink.put_u64("nodeinfo.port_guid", base + 20, pkt.read_u64()?);
    sink.put_u16("nodeinfo.partition_cap", base + 28, pkt.read_u16()?);
    sink.put_u16("nodeinfo.device_id", base + 30, pkt.read_u16()?);
    sink.put_u32("nodeinfo.revision", base + 32, pkt.read_u32()?);
    sink.put_u8("nodeinfo.local_port_num", base + 36, pkt.read_u8()?);
    sink.put_u24("nodeinfo.vendor_id", base + 37, pkt.read_u24()?);
    Ok(())
}

pub(crate) fn parse_switch_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(17)?;
    sink.put_u16("switchinfo.linear_fdb_cap", base, pkt.read_u16()?);
    sink.put_u16("switchinfo.random_fdb_cap", base + 2, pkt.read_u16()?);
    sink.put_u16("switchinfo.multicast_fdb_cap", base + 4, pkt.read_u16()?);
    sink.put_u16("switchinfo.linear_fdb_top", base + 6, pkt.read_u16()?);
    sink.put_u8("switchinfo.default_port", base + 8, pkt.read_u8()?);
    sink.put_u8("switchinfo.default_mcast_primary_port", base + 9, pkt.read_u8()?);
    sink.put_u8("switchinfo.default_mcast_not_primary_port", base + 10, pkt.read_u8()?);
    let life_state = pkt.read_u8()?;
    sink.put_u8("switchinfo.lifetime_value", base + 11, (life_state & 0xF8) >> 3);
    sink.put_flag("switchinfo.port_state_change", base + 11, 1, life_state & 0x04 != 0);
    sink.put_u8("switchinfo.optimized_sl_to_vl", base + 11, life_state & 0x03);
    sink.put_u16("switchinfo.lids_per_port", base + 12, pkt.read_u16()?);
    sink.put_u16("switchinfo.partition_enforcement_cap", base + 14, pkt.read_u16()?);
    let enforce = pkt.read_u8()?;
    sink.put_flag("switchinfo.inbound_enforcement", base + 16, 1, enforce & 0x80 != 0);
    sink.put_flag("switchinfo.outbound_enforcement", base + 16, 1, enforce & 0x40 != 0);
    sink.put_flag("switchinfo.filter_raw_inbound", base + 16, 1, enforce & 0x20 != 0);
    sink.put_flag("switchinfo.filter_raw_outbound", base + 16, 1, enforce & 0x10 != 0);
    sink.put_flag("switchinfo.enhanced_port0", base + 16, 1, enforce & 0x08 != 0);
    Ok(())
}

pub(crate) fn parse_guid_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..8 {
        sink.put_u64("guidinfo.guid", base + i * 8, pkt.read_u64()?);
    }
    Ok(())
}

/// Split a 32-bit capability mask into its defined flags and return the
/// re-assembled value (round-trips by construction for defined bits).
pub fn capability_mask_flags(mask: u32) -> (PortCapabilityMask, u32) {
    let flags = PortCapabilityMask::from_bits_truncate(mask);
    (flags, flags.bits())
}

/// 60-byte PortInfo record.
pub(crate) fn parse_port_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(60)?;
    sink.put_u64("portinfo.m_key", base, pkt.read_u64()?);
    sink.put_u64("portinfo.gid_prefix", base + 8, pkt.read_u64()?);
    sink.put_u16("portinfo.lid", base + 16, pkt.read_u16()?);
    sink.put_u16("portinfo.master_sm_lid", base + 18, pkt.read_u16()?);

    let cap = pkt.read_u32()?;
    sink.put_u32("portinfo.capability_mask", base + 20, cap);
    let (flags, _) = capability_mask_flags(cap);
    for (flag, name) in CAP_FLAG_NAMES {
        sink.put_flag(name, base + 20, 4, flags.contains(*flag));
    }

    sink.put_u16("portinfo.diag_code", base + 24, pkt.read_u16()?);
    sink.put_u16("portinfo.m_key_lease_period", base + 26, pkt.read_u16()?);
    sink.put_u8("portinfo.local_port_num", base + 28, pkt.read_u8()?);
    sink.put_u8("portinfo.link_width_enabled", base + 29, pkt.read_u8()?);
    sink.put_u8("portinfo.link_width_supported", base + 30, pkt.read_u8()?);
    sink.put_u8("portinfo.link_width_active", base + 31, pkt.read_u8()?);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.link_speed_supported", base + 32, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.port_state", base + 32, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.port_physical_state", base + 33, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.link_down_default_state", base + 33, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.m_key_protect_bits", base + 34, (b & 0xC0) >> 6);
    sink.put_u8("portinfo.lmc", base + 34, b & 0x07);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.link_speed_active", base + 35, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.link_speed_enabled", base + 35, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.neighbor_mtu", base + 36, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.master_sm_sl", base + 36, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.vl_cap", base + 37, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.init_type", base + 37, b & 0x0F);
    sink.put_u8("portinfo.vl_high_limit", base + 38, pkt.read_u8()?);
    sink.put_u8("portinfo.vl_arbitration_high_cap", base + 39, pkt.read_u8()?);
    sink.put_u8("portinfo.vl_arbitration_low_cap", base + 40, pkt.read_u8()?);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.init_type_reply", base + 41, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.mtu_cap", base + 41, b & 0x0F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.vl_stall_count", base + 42, (b & 0xE0) >> 5);
    sink.put_u8("portinfo.hoq_life", base + 42, b & 0x1F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.operational_vls", base + 43, (b & 0xF0) >> 4);
    sink.put_flag("portinfo.partition_enforcement_inbound", base + 43, 1, b & 0x08 != 0);
    sink.put_flag("portinfo.partition_enforcement_outbound", base + 43, 1, b & 0x04 != 0);
    sink.put_flag("portinfo.filter_raw_inbound", base + 43, 1, b & 0x02 != 0);
    sink.put_flag("portinfo.filter_raw_outbound", base + 43, 1, b & 0x01 != 0);
    sink.put_u16("portinfo.m_key_violations", base + 44, pkt.read_u16()?);
    sink.put_u16("portinfo.p_key_violations", base + 46, pkt.read_u16()?);
    sink.put_u16("portinfo.q_key_violations", base + 48, pkt.read_u16()?);
    sink.put_u8("portinfo.guid_cap", base + 50, pkt.read_u8()?);
    let b = pkt.read_u8()?;
    sink.put_flag("portinfo.client_reregister", base + 51, 1, b & 0x80 != 0);
    sink.put_u8("portinfo.subnet_timeout", base + 51, b & 0x1F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.resp_time_value", base + 52, b & 0x1F);
    let b = pkt.read_u8()?;
    sink.put_u8("portinfo.local_phy_errors", base + 53, (b & 0xF0) >> 4);
    sink.put_u8("portinfo.overrun_errors", base + 53, b & 0x0F);
    sink.put_u16("portinfo.max_credit_hint", base + 54, pkt.read_u16()?);
    pkt.advance(1)?; // reserved
    sink.put_u24("portinfo.link_round_trip_latency", base + 57, pkt.read_u24()?);
    Ok(())
}

pub(crate) fn parse_pkey_table(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..32 {
        let entry = pkt.read_u16()?;
        sink.put_u16("pkeytable.pkey", base + i * 2, entry);
    }
    Ok(())
}

pub(crate) fn parse_sl_to_vl_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(8)?;
    for i in 0..8 {
        let b = pkt.read_u8()?;
        sink.put_u8("sltovl.vl", base + i, (b & 0xF0) >> 4);
        sink.put_u8("sltovl.vl", base + i, b & 0x0F);
    }
    Ok(())
}

pub(crate) fn parse_vl_arbitration_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..32 {
        let vl = pkt.read_u8()?;
        let weight = pkt.read_u8()?;
        sink.put_u8("vlarb.vl", base + i * 2, vl & 0x0F);
        sink.put_u8("vlarb.weight", base + i * 2 + 1, weight);
    }
    Ok(())
}

pub(crate) fn parse_linear_forwarding_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..64 {
        sink.put_u8("lft.port", base + i, pkt.read_u8()?);
    }
    Ok(())
}

pub(crate) fn parse_random_forwarding_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..16 {
        let entry = base + i * 4;
        sink.put_u16("rft.lid", entry, pkt.read_u16()?);
        let b = pkt.read_u8()?;
        sink.put_flag("rft.valid", entry + 2, 1, b & 0x80 != 0);
        sink.put_u8("rft.lmc", entry + 2, b & 0x07);
        sink.put_u8("rft.port", entry + 3, pkt.read_u8()?);
    }
    Ok(())
}

pub(crate) fn parse_multicast_forwarding_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    for i in 0..32 {
        sink.put_u16("mft.port_mask", base + i * 2, pkt.read_u16()?);
    }
    Ok(())
}

pub(crate) fn parse_link_speed_width_pairs_table(
    pkt: &mut PktView,
    sink: &mut FieldSink,
) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    sink.put_u8("lswp.num_tables", base, pkt.read_u8()?);
    pkt.advance(3)?; // reserved
    let mask = pkt.read_bytes(32)?;
    sink.put_bytes("lswp.port_mask", base + 4, mask);
    for i in 0..14 {
        let entry = base + 36 + i * 2;
        sink.put_u8("lswp.speed", entry, pkt.read_u8()?);
        sink.put_u8("lswp.width", entry + 1, pkt.read_u8()?);
    }
    Ok(())
}

/// 21-byte SMInfo record.
pub(crate) fn parse_sm_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(21)?;
    sink.put_u64("sminfo.guid", base, pkt.read_u64()?);
    sink.put_u64("sminfo.sm_key", base + 8, pkt.read_u64()?);
    sink.put_u32("sminfo.act_count", base + 16, pkt.read_u32()?);
    let b = pkt.read_u8()?;
    sink.put_u8("sminfo.priority", base + 20, (b & 0xF0) >> 4);
    sink.put_u8("sminfo.sm_state", base + 20, b & 0x0F);
    Ok(())
}

pub(crate) fn parse_vendor_diag(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    pkt.require(64)?;
    sink.put_u16("vendordiag.next_index", base, pkt.read_u16()?);
    let data = pkt.read_bytes(62)?;
    sink.put_bytes("vendordiag.diag_data", base + 2, data);
    Ok(())
}

pub(crate) fn parse_led_info(pkt: &mut PktView, sink: &mut FieldSink) -> Result<(), DissectError> {
    let base = pkt.offset();
    let word = pkt.read_u32()?;
    sink.put_flag("ledinfo.led_mask", base, 4, word & 0x8000_0000 != 0);
    Ok(())
}
