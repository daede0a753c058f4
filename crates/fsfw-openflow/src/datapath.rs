//! Switch datapath identifier type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 64-bit OpenFlow datapath identifier.
///
/// Stable for a switch's connected lifetime and used as the cache key for
/// everything the daemon tracks about that switch.
///
/// # Examples
///
/// ```
/// use fsfw_openflow::DatapathId;
///
/// let dpid = DatapathId::new(0x1);
/// assert_eq!(dpid.to_string(), "00:00:00:00:00:00:00:01");
///
/// let parsed: DatapathId = "00:00:00:00:00:00:00:01".parse().unwrap();
/// assert_eq!(parsed, dpid);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatapathId(u64);

impl DatapathId {
    /// Creates a datapath identifier from its raw 64-bit value.
    pub const fn new(raw: u64) -> Self {
        DatapathId(raw)
    }

    /// Returns the raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DatapathId {
    fn from(raw: u64) -> Self {
        DatapathId(raw)
    }
}

impl From<DatapathId> for u64 {
    fn from(dpid: DatapathId) -> u64 {
        dpid.0
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for DatapathId {
    type Err = ParseError;

    /// Accepts the colon-separated hex form (`00:00:00:00:00:00:00:01`) and
    /// the plain or `0x`-prefixed hex form (`0x1`, `1a2b`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() != 8 {
                return Err(ParseError::InvalidDatapathId(s.to_string()));
            }
            let mut raw: u64 = 0;
            for part in parts {
                let byte = u8::from_str_radix(part, 16)
                    .map_err(|_| ParseError::InvalidDatapathId(s.to_string()))?;
                raw = (raw << 8) | u64::from(byte);
            }
            return Ok(DatapathId(raw));
        }

        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(DatapathId)
            .map_err(|_| ParseError::InvalidDatapathId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_colon_hex() {
        let dpid = DatapathId::new(0x0000_0000_0000_00ff);
        assert_eq!(dpid.to_string(), "00:00:00:00:00:00:00:ff");
    }

    #[test]
    fn test_parse_colon_form() {
        let dpid: DatapathId = "00:00:00:00:00:00:1a:2b".parse().unwrap();
        assert_eq!(dpid.as_u64(), 0x1a2b);
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!("0x1".parse::<DatapathId>().unwrap(), DatapathId::new(1));
        assert_eq!("1a2b".parse::<DatapathId>().unwrap(), DatapathId::new(0x1a2b));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("00:01".parse::<DatapathId>().is_err());
        assert!("zz".parse::<DatapathId>().is_err());
        assert!("00:00:00:00:00:00:00:zz".parse::<DatapathId>().is_err());
    }

    #[test]
    fn test_round_trip() {
        let dpid = DatapathId::new(0xdead_beef_0102_0304);
        let parsed: DatapathId = dpid.to_string().parse().unwrap();
        assert_eq!(parsed, dpid);
    }
}
