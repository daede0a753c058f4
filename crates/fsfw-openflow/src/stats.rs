//! Flow and port counter reply records and the two stats request shapes.

use crate::FlowMatch;
use serde::{Deserialize, Serialize};

/// OpenFlow 1.0 `OFPP_NONE`: no port filter in a stats request.
pub const PORT_NONE: u16 = 0xffff;

/// Table id meaning "all tables" in a flow stats request.
pub const TABLE_ALL: u8 = 0xff;

/// One flow-table entry's observed counters, as reported by a switch.
///
/// Snapshot value: the cache replaces a switch's entire entry list each poll
/// cycle and never mutates one in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowStatsEntry {
    /// Table the entry lives in.
    pub table_id: u8,
    /// Match criteria of the entry.
    pub flow_match: FlowMatch,
    /// Seconds the entry has been installed.
    pub duration_sec: u32,
    /// Nanosecond remainder of the duration.
    pub duration_nsec: u32,
    /// Entry priority.
    pub priority: u16,
    /// Idle timeout the switch reports for the entry, in seconds.
    pub idle_timeout: u16,
    /// Hard timeout the switch reports for the entry, in seconds.
    pub hard_timeout: u16,
    /// Opaque controller cookie.
    pub cookie: u64,
    /// Packets matched by the entry.
    pub packet_count: u64,
    /// Bytes matched by the entry.
    pub byte_count: u64,
}

impl FlowStatsEntry {
    /// Creates an entry for the given match with zeroed counters.
    pub fn new(flow_match: FlowMatch) -> Self {
        FlowStatsEntry {
            flow_match,
            ..FlowStatsEntry::default()
        }
    }
}

/// One switch port's observed counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortStatsEntry {
    /// Port number the counters belong to.
    pub port_no: u16,
    /// Received packets.
    pub rx_packets: u64,
    /// Transmitted packets.
    pub tx_packets: u64,
    /// Received bytes.
    pub rx_bytes: u64,
    /// Transmitted bytes.
    pub tx_bytes: u64,
    /// Packets dropped on receive.
    pub rx_dropped: u64,
    /// Packets dropped on transmit.
    pub tx_dropped: u64,
    /// Receive errors.
    pub rx_errors: u64,
    /// Transmit errors.
    pub tx_errors: u64,
    /// Frame alignment errors.
    pub rx_frame_err: u64,
    /// Receive overrun errors.
    pub rx_over_err: u64,
    /// CRC errors.
    pub rx_crc_err: u64,
    /// Collision count.
    pub collisions: u64,
}

impl PortStatsEntry {
    /// Creates an entry for the given port with zeroed counters.
    pub fn new(port_no: u16) -> Self {
        PortStatsEntry {
            port_no,
            ..PortStatsEntry::default()
        }
    }
}

/// Flow stats request body.
///
/// The poll cycle always issues [`FlowStatsRequest::all_flows`]; the shape is
/// kept explicit so a policy layer can reuse the contract for narrower
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsRequest {
    /// Match filter; fully wildcarded selects every flow.
    pub flow_match: FlowMatch,
    /// Table filter, [`TABLE_ALL`] for every table.
    pub table_id: u8,
    /// Output-port filter, [`PORT_NONE`] for no filter.
    pub out_port: u16,
}

impl FlowStatsRequest {
    /// The request the poll cycle issues: all flows, any table, any output
    /// port, fully wildcarded match.
    pub fn all_flows() -> Self {
        FlowStatsRequest {
            flow_match: FlowMatch::any(),
            table_id: TABLE_ALL,
            out_port: PORT_NONE,
        }
    }
}

impl Default for FlowStatsRequest {
    fn default() -> Self {
        FlowStatsRequest::all_flows()
    }
}

/// Port stats request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatsRequest {
    /// Port filter, [`PORT_NONE`] for all ports.
    pub port_no: u16,
}

impl PortStatsRequest {
    /// The request the poll cycle issues: counters for every port.
    pub fn all_ports() -> Self {
        PortStatsRequest { port_no: PORT_NONE }
    }
}

impl Default for PortStatsRequest {
    fn default() -> Self {
        PortStatsRequest::all_ports()
    }
}
