//! Contract the switch connection layer implements to answer stats queries.

use crate::{DatapathId, FlowStatsEntry, FlowStatsRequest, PortStatsEntry, PortStatsRequest};
use async_trait::async_trait;

/// Errors a stats query can resolve to.
///
/// Every variant is recovered per switch by the caller; none of them is
/// fatal to a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsQueryError {
    #[error("switch {0} is not connected")]
    NotConnected(DatapathId),

    #[error("stats request to {0} timed out")]
    Timeout(DatapathId),

    #[error("malformed stats reply from {dpid}: {reason}")]
    MalformedReply { dpid: DatapathId, reason: String },

    #[error("protocol error talking to {dpid}: {reason}")]
    Protocol { dpid: DatapathId, reason: String },
}

/// Asynchronous stats-query operations against managed switches.
///
/// Implemented by the layer that owns the actual switch connections; the
/// poll cycle driver only ever sees this trait. Each call must resolve
/// (success, empty, or failure) on its own; the driver additionally bounds
/// every call with its configured wait and treats an elapsed bound as a
/// failure for that switch in the current cycle.
#[async_trait]
pub trait SwitchStatsClient: Send + Sync {
    /// Returns the datapath ids of the currently managed switches.
    fn switches(&self) -> Vec<DatapathId>;

    /// Fetches flow-table counters from one switch.
    async fn flow_stats(
        &self,
        dpid: DatapathId,
        request: FlowStatsRequest,
    ) -> Result<Vec<FlowStatsEntry>, StatsQueryError>;

    /// Fetches port counters from one switch.
    async fn port_stats(
        &self,
        dpid: DatapathId,
        request: PortStatsRequest,
    ) -> Result<Vec<PortStatsEntry>, StatsQueryError>;
}
