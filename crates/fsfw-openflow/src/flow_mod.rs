//! Registration-record view of an installed flow rule.

use crate::FlowMatch;
use serde::{Deserialize, Serialize};

/// The fields of a flow-mod message the stat engine tracks.
///
/// This is the bookkeeping view the policy layer hands to the cache when it
/// installs or removes a rule; actions and wire framing stay with the layer
/// that owns the switch connection. A zero timeout field means the rule does
/// not carry that kind of expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowMod {
    /// Match criteria of the rule.
    pub flow_match: FlowMatch,
    /// Opaque controller cookie.
    pub cookie: u64,
    /// Rule priority.
    pub priority: u16,
    /// Idle (soft) timeout in seconds, zero for none.
    pub idle_timeout: u16,
    /// Hard timeout in seconds, zero for none.
    pub hard_timeout: u16,
}

impl FlowMod {
    /// Creates a record for the given match with no timeouts.
    pub fn new(flow_match: FlowMatch) -> Self {
        FlowMod {
            flow_match,
            ..FlowMod::default()
        }
    }

    /// Returns true if the rule declares neither timeout.
    pub fn is_permanent(&self) -> bool {
        self.idle_timeout == 0 && self.hard_timeout == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wildcards;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_permanent_rule() {
        let rule = FlowMod::new(FlowMatch::any());
        assert!(rule.is_permanent());
        assert_eq!(rule.priority, 0);
    }

    #[test]
    fn test_timed_rule() {
        let rule = FlowMod {
            idle_timeout: 30,
            ..FlowMod::new(FlowMatch {
                dl_vlan: 7,
                wildcards: wildcards::ALL & !wildcards::DL_VLAN,
                ..FlowMatch::any()
            })
        };
        assert!(!rule.is_permanent());
    }
}
