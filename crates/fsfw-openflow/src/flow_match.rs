//! OpenFlow 1.0 flow match structure.

use crate::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// OpenFlow 1.0 `ofp_flow_wildcards` bit values.
///
/// A set bit means the corresponding field is ignored when the switch
/// matches packets against the rule.
pub mod wildcards {
    /// Ignore the ingress port.
    pub const IN_PORT: u32 = 1 << 0;
    /// Ignore the VLAN id.
    pub const DL_VLAN: u32 = 1 << 1;
    /// Ignore the Ethernet source address.
    pub const DL_SRC: u32 = 1 << 2;
    /// Ignore the Ethernet destination address.
    pub const DL_DST: u32 = 1 << 3;
    /// Ignore the Ethernet frame type.
    pub const DL_TYPE: u32 = 1 << 4;
    /// Ignore the IP protocol.
    pub const NW_PROTO: u32 = 1 << 5;
    /// Ignore the TCP/UDP source port.
    pub const TP_SRC: u32 = 1 << 6;
    /// Ignore the TCP/UDP destination port.
    pub const TP_DST: u32 = 1 << 7;
    /// Bit offset of the IP source address prefix-length field.
    pub const NW_SRC_SHIFT: u32 = 8;
    /// Bit offset of the IP destination address prefix-length field.
    pub const NW_DST_SHIFT: u32 = 14;
    /// Ignore the VLAN priority.
    pub const DL_VLAN_PCP: u32 = 1 << 20;
    /// Ignore the IP type-of-service bits.
    pub const NW_TOS: u32 = 1 << 21;
    /// Every field wildcarded: matches all flows.
    pub const ALL: u32 = (1 << 22) - 1;
}

/// An OpenFlow 1.0 twelve-tuple match.
///
/// Structural equality (including the `wildcards` mask) is the identity the
/// stat cache uses to correlate installed rules with polled flow-table
/// entries, so two rules differing only in wildcard bits are distinct.
///
/// # Examples
///
/// ```
/// use fsfw_openflow::FlowMatch;
///
/// let any = FlowMatch::any();
/// assert!(any.is_any());
///
/// let vlan = FlowMatch { dl_vlan: 100, ..FlowMatch::any() };
/// assert_ne!(vlan, any);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    /// Wildcard bits, see [`wildcards`].
    pub wildcards: u32,
    /// Ingress port.
    pub in_port: u16,
    /// Ethernet source address.
    pub dl_src: MacAddr,
    /// Ethernet destination address.
    pub dl_dst: MacAddr,
    /// VLAN id.
    pub dl_vlan: u16,
    /// VLAN priority.
    pub dl_vlan_pcp: u8,
    /// Ethernet frame type.
    pub dl_type: u16,
    /// IP type-of-service bits.
    pub nw_tos: u8,
    /// IP protocol.
    pub nw_proto: u8,
    /// IP source address.
    pub nw_src: Ipv4Addr,
    /// IP destination address.
    pub nw_dst: Ipv4Addr,
    /// TCP/UDP source port.
    pub tp_src: u16,
    /// TCP/UDP destination port.
    pub tp_dst: u16,
}

impl FlowMatch {
    /// The fully wildcarded match, used by the all-flows stats request.
    pub fn any() -> Self {
        FlowMatch {
            wildcards: wildcards::ALL,
            in_port: 0,
            dl_src: MacAddr::ZERO,
            dl_dst: MacAddr::ZERO,
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }

    /// Returns true if every field is wildcarded.
    pub fn is_any(&self) -> bool {
        self.wildcards == wildcards::ALL
    }
}

impl Default for FlowMatch {
    fn default() -> Self {
        FlowMatch::any()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "match[any]");
        }
        write!(f, "match[wildcards={:#x}", self.wildcards)?;
        if self.wildcards & wildcards::IN_PORT == 0 {
            write!(f, ",in_port={}", self.in_port)?;
        }
        if self.wildcards & wildcards::DL_VLAN == 0 {
            write!(f, ",dl_vlan={}", self.dl_vlan)?;
        }
        if self.wildcards & wildcards::DL_SRC == 0 {
            write!(f, ",dl_src={}", self.dl_src)?;
        }
        if self.wildcards & wildcards::DL_DST == 0 {
            write!(f, ",dl_dst={}", self.dl_dst)?;
        }
        if self.wildcards & wildcards::DL_TYPE == 0 {
            write!(f, ",dl_type={:#06x}", self.dl_type)?;
        }
        if self.wildcards & wildcards::NW_PROTO == 0 {
            write!(f, ",nw_proto={}", self.nw_proto)?;
        }
        write!(f, "]")
    }
}
