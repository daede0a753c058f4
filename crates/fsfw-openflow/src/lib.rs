//! OpenFlow 1.0 value types for the flowspace firewall control plane.
//!
//! This crate provides the protocol-boundary types consumed by the
//! stat-collection daemon and the policy layer:
//!
//! - [`DatapathId`]: 64-bit switch datapath identifiers
//! - [`MacAddr`]: 48-bit Ethernet addresses used in match fields
//! - [`FlowMatch`]: the OpenFlow 1.0 twelve-tuple match structure
//! - [`FlowMod`]: the registration-record view of an installed flow rule
//! - [`FlowStatsEntry`] / [`PortStatsEntry`]: per-flow and per-port counters
//! - [`FlowStatsRequest`] / [`PortStatsRequest`]: the two stats request shapes
//! - [`SwitchStatsClient`]: the async contract a switch connection layer
//!   implements to answer stats requests
//!
//! No wire encoding lives here; framing and connection management belong to
//! the layer that implements [`SwitchStatsClient`].

mod client;
mod datapath;
mod flow_match;
mod flow_mod;
mod mac;
mod stats;

pub use client::{StatsQueryError, SwitchStatsClient};
pub use datapath::DatapathId;
pub use flow_match::{wildcards, FlowMatch};
pub use flow_mod::FlowMod;
pub use mac::MacAddr;
pub use stats::{
    FlowStatsEntry, FlowStatsRequest, PortStatsEntry, PortStatsRequest, PORT_NONE, TABLE_ALL,
};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddr(String),

    #[error("invalid datapath id format: {0}")]
    InvalidDatapathId(String),
}
