//! InfiniBand wire-protocol decoder.
//!
//! Reconstructs the variable, opcode-dependent chain of IBA headers from
//! a raw octet stream: LRH classification, optional GRH, BTH, the
//! opcode-selected extended transport headers, then either an embedded
//! payload (opaque or Ethertype-framed) or a Management Datagram with
//! its SMP / SA attribute records. Each decode is a single synchronous
//! pass over one in-memory buffer; the decoder holds no cross-call
//! state, so callers may run one decode per captured frame in parallel.

pub mod ib_dissect;
pub mod ib_error;
pub mod ib_ethertype;
pub mod ib_field;
pub mod ib_hdr;
pub mod ib_icrc;
pub mod ib_mad;
pub mod ib_opcode;
pub mod ib_pkt;
pub mod ib_rmpp;
pub mod ib_sa;
pub mod ib_schema;
pub mod ib_smp;

pub use ib_dissect::{IbDissector, PacketSummary};
pub use ib_error::{DissectError, SubDissectError};
pub use ib_ethertype::{EtherTypeRegistry, SubDissector};
pub use ib_field::{FieldRecord, FieldSink, FieldValue};
pub use ib_hdr::LinkNextHeader;
pub use ib_opcode::{resolve, HeaderSequence};
pub use ib_pkt::PktView;
pub use ib_schema::IbSchema;
