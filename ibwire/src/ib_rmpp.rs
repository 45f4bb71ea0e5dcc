use crate::ib_error::DissectError;
use crate::ib_field::FieldSink;
use crate::ib_pkt::PktView;
use crate::ib_schema::IbSchema;

/// Reliable Multi-Packet Transaction Protocol segment header, carried by
/// Subnet Administration datagrams ahead of the SA header.

pub const IB_RMPP_BYTES: usize = 12;

pub mod rmpp_type {
    pub type Type = u8;
    pub const NOT_USED: Type = 0x00;
    pub const DATA: Type = 0x01;
    pub const ACK: Type = 0x02;
    pub const STOP: Type = 0x03;
    pub const ABORT: Type = 0x04;
}

pub mod rmpp_mask {
    pub const RMPP_RTIME_MASK: u8 = 0xF0;
    pub const RMPP_FLAGS_MASK: u8 = 0x0F;
    pub const RMPP_FLAG_ACTIVE: u8 = 0x01;
    pub const RMPP_FLAG_FIRST: u8 = 0x02;
    pub const RMPP_FLAG_LAST: u8 = 0x04;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IbRmpp {
    pub version: u8,
    pub rmpp_type: u8,
    pub rtime_flags: u8,
    pub status: u8,
    /// segment number for Data/Ack, first reserved word otherwise
    pub word1: u32,
    /// payload length for Data, new-window-last for Ack, reserved otherwise
    pub word2: u32,
}

impl IbRmpp {
    #[inline]
    pub fn resp_time(&self) -> u8 {
        (self.rtime_flags & rmpp_mask::RMPP_RTIME_MASK) >> 4
    }
    #[inline]
    pub fn flags(&self) -> u8 {
        self.rtime_flags & rmpp_mask::RMPP_FLAGS_MASK
    }
    #[inline]
    pub fn is_data(&self) -> bool {
        self.rmpp_type == rmpp_type::DATA
    }

    pub fn parse(
        schema: &IbSchema,
        pkt: &mut PktView,
        sink: &mut FieldSink,
    ) -> Result<Self, DissectError> {
        let base = pkt.offset();
        pkt.require(IB_RMPP_BYTES)?;
        let mut rmpp = IbRmpp {
            version: pkt.read_u8()?,
            rmpp_type: pkt.read_u8()?,
            rtime_flags: pkt.read_u8()?,
            status: pkt.read_u8()?,
            ..Default::default()
        };
        sink.put_u8("rmpp.version", base, rmpp.version);
        sink.put_u8("rmpp.type", base + 1, rmpp.rmpp_type);
        sink.put_text(
            "rmpp.type_name",
            base + 1,
            1,
            schema.rmpp_type_name(rmpp.rmpp_type).to_string(),
        );
        sink.put_u8("rmpp.resp_time", base + 2, rmpp.resp_time());
        sink.put_flag(
            "rmpp.flag.active",
            base + 2,
            1,
            rmpp.flags() & rmpp_mask::RMPP_FLAG_ACTIVE != 0,
        );
        sink.put_flag(
            "rmpp.flag.first",
            base + 2,
            1,
            rmpp.flags() & rmpp_mask::RMPP_FLAG_FIRST != 0,
        );
        sink.put_flag(
            "rmpp.flag.last",
            base + 2,
            1,
            rmpp.flags() & rmpp_mask::RMPP_FLAG_LAST != 0,
        );
        sink.put_u8("rmpp.status", base + 3, rmpp.status);

        rmpp.word1 = pkt.read_u32()?;
        rmpp.word2 = pkt.read_u32()?;
        match rmpp.rmpp_type {
            rmpp_type::DATA => {
                sink.put_u32("rmpp.segment_number", base + 4, rmpp.word1);
                sink.put_u32("rmpp.payload_length", base + 8, rmpp.word2);
            }
            rmpp_type::ACK => {
                sink.put_u32("rmpp.segment_number", base + 4, rmpp.word1);
                sink.put_u32("rmpp.new_window_last", base + 8, rmpp.word2);
            }
            _ => {
                sink.put_u32("rmpp.reserved1", base + 4, rmpp.word1);
                sink.put_u32("rmpp.reserved2", base + 8, rmpp.word2);
            }
        }
        Ok(rmpp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn parse(raw: &[u8]) -> (IbRmpp, FieldSink) {
        let schema = IbSchema::new();
        let mut pkt = PktView::new(Bytes::copy_from_slice(raw));
        let mut sink = FieldSink::new();
        let rmpp = IbRmpp::parse(&schema, &mut pkt, &mut sink).unwrap();
        (rmpp, sink)
    }

    #[test]
    fn check_data_segment_tail() {
        let raw = [
            0x01, 0x01, 0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xC8,
        ];
        let (rmpp, sink) = parse(&raw);
        assert!(rmpp.is_data());
        assert_eq!(rmpp.resp_time(), 1);
        assert_eq!(rmpp.flags(), 0x7);
        assert_eq!(rmpp.word1, 1);
        assert_eq!(rmpp.word2, 200);
        assert!(sink.find("rmpp.payload_length").is_some());
        assert!(sink.find("rmpp.new_window_last").is_none());
    }

    #[test]
    fn check_ack_tail() {
        let raw = [
            0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x10,
        ];
        let (rmpp, sink) = parse(&raw);
        assert_eq!(rmpp.rmpp_type, rmpp_type::ACK);
        assert_eq!(rmpp.word2, 16);
        assert!(sink.find("rmpp.new_window_last").is_some());
    }

    #[test]
    fn check_stop_tail_is_reserved() {
        let raw = [0x01, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0];
        let (rmpp, sink) = parse(&raw);
        assert_eq!(rmpp.status, 1);
        assert!(sink.find("rmpp.reserved1").is_some());
    }

    #[test]
    fn check_truncated_rmpp() {
        let schema = IbSchema::new();
        let mut pkt = PktView::new(Bytes::from_static(&[0x01, 0x01, 0x00]));
        let mut sink = FieldSink::new();
        assert!(matches!(
            IbRmpp::parse(&schema, &mut pkt, &mut sink),
            Err(DissectError::TruncatedBuffer { .. })
        ));
    }
}
