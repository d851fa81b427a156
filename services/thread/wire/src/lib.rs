//! Wire formats for Thread Mesh Link Establishment.
//!
//! This crate provides the low-level encoding and decoding used by the MLE
//! control plane: the TLV codec with checked-capacity writers, the MLE
//! security header and message framing, and the structured TLV values that
//! drive attach, partition management and network-data propagation.
//!
//! ## Features
//!
//! - **Zero-Copy Reads**: TLVs are yielded as borrowed slices of the payload
//! - **Checked Writes**: every append is bounded by the message capacity
//! - **Serial Arithmetic**: wraparound-aware version and sequence comparison
//! - **Network Data**: stable/temporary tagging and on-demand stable subsets
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8 security suite    | 0x00 secured, 0xFF none    |
//! +----------------------+----------------------------+
//! | Security Header (opt)| 5..14B                     |
//! +----------------------+----------------------------+
//! | u8 command           | MLE command type           |
//! +----------------------+----------------------------+
//! | TLV*                 | type(1) len(1|1+2) value   |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;
pub mod header;
pub mod leader_data;
pub mod message;
pub mod mode;
pub mod network_data;
pub mod route64;
pub mod serial;
pub mod tlv;

// Re-export main types
pub use address::{
    address_from_iid, child_id_from_rloc16, is_link_local, is_router_rloc16,
    link_local_from_mac64, mac64_from_link_local, rloc16_from_router_id, rloc_address,
    router_id_from_rloc16, AddressEntry, RLOC16_INVALID, RLOC16_UNASSIGNED,
};
pub use error::WireError;
pub use header::{KeyIdMode, SecurityHeader, MLE_SECURITY_LEVEL};
pub use leader_data::{LeaderData, LEADER_DATA_LEN};
pub use message::{MessageBuilder, MleCommand, MleMessage, DEFAULT_MESSAGE_CAPACITY};
pub use mode::{Channel, Connectivity, DeviceMode, ScanMask, Timestamp};
pub use network_data::{
    BorderRouterEntry, BorderRouterFlags, ContextEntry, HasRouteEntry, NetworkData,
    NetworkDataKind, PrefixEntry, STABLE_FLAG,
};
pub use route64::{Route64, RouteEntry, INFINITE_COST, MAX_ROUTER_ID};
pub use serial::{is_greater_u16, is_greater_u8};
pub use tlv::{TlvIter, TlvSlice, TlvType, TlvWriter};
