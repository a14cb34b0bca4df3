use serde::{Deserialize, Serialize};

use crate::core::{ClockId, ProtocolVersion};

/// Protocol-wide attributes fetched once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAttributes {
    /// Number of clock domains; ids are `0..clock_count`
    pub clock_count: u16,
    /// Firmware bound on concurrently outstanding asynchronous rate changes
    pub max_async_requests: u8,
}

/// Rates a domain can be programmed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateRepresentation {
    /// Sorted ascending list of supported rates in Hz
    Discrete(Vec<u64>),
    /// Any rate in `min..=max` reachable in `step` increments
    Continuous {
        min: u64,
        max: u64,
        step: u64,
    },
}

impl Default for RateRepresentation {
    fn default() -> Self {
        RateRepresentation::Discrete(Vec::new())
    }
}

impl RateRepresentation {
    /// Returns true for a discrete list
    pub fn is_discrete(&self) -> bool {
        matches!(self, RateRepresentation::Discrete(_))
    }

    /// Lowest advertised rate, if any
    pub fn min_rate(&self) -> Option<u64> {
        match self {
            RateRepresentation::Discrete(rates) => rates.first().copied(),
            RateRepresentation::Continuous { min, .. } => Some(*min),
        }
    }

    /// Highest advertised rate, if any
    pub fn max_rate(&self) -> Option<u64> {
        match self {
            RateRepresentation::Discrete(rates) => rates.last().copied(),
            RateRepresentation::Continuous { max, .. } => Some(*max),
        }
    }
}

/// One firmware-managed clock domain
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockDomain {
    /// Domain id, equal to the table index
    pub id: ClockId,
    /// Short or extended name; empty when the domain is absent
    pub name: String,
    /// Enable latency in microseconds, `None` when unknown
    pub enable_latency: Option<u32>,
    /// Supported rates
    pub rates: RateRepresentation,
    /// Possible parent domain ids; the index is the parent selector
    pub parents: Vec<ClockId>,
    /// Firmware can report completed rate changes
    pub rate_changed_notifications: bool,
    /// Firmware can report rate changes requested by other agents
    pub rate_change_requested_notifications: bool,
    /// This agent may not change the rate
    pub rate_control_forbidden: bool,
    /// This agent may not gate or ungate the clock
    pub state_control_forbidden: bool,
    /// This agent may not select the parent
    pub parent_control_forbidden: bool,
    /// Revision governing this domain's configuration messages
    pub protocol_version: ProtocolVersion,
}

impl ClockDomain {
    pub(crate) fn new(id: ClockId, protocol_version: ProtocolVersion) -> Self {
        ClockDomain {
            id,
            protocol_version,
            ..Default::default()
        }
    }

    /// A domain whose discovery failed carries no name
    pub fn is_present(&self) -> bool {
        !self.name.is_empty()
    }

    /// Parent domain id behind a parent selector
    pub fn parent(&self, selector: usize) -> Option<ClockId> {
        self.parents.get(selector).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_bounds() {
        let discrete = RateRepresentation::Discrete(vec![1_000, 2_000, 4_000]);
        assert_eq!(discrete.min_rate(), Some(1_000));
        assert_eq!(discrete.max_rate(), Some(4_000));

        let range = RateRepresentation::Continuous { min: 10, max: 100, step: 5 };
        assert!(!range.is_discrete());
        assert_eq!(range.max_rate(), Some(100));

        assert_eq!(RateRepresentation::default().min_rate(), None);
    }

    #[test]
    fn test_domain_presence() {
        let mut domain = ClockDomain::new(3, ProtocolVersion::new(2, 0));
        assert!(!domain.is_present());
        domain.name = "pll0".to_string();
        assert!(domain.is_present());
    }

    #[test]
    fn test_parent_selector() {
        let domain = ClockDomain {
            parents: vec![4, 7],
            ..ClockDomain::new(0, ProtocolVersion::new(2, 0))
        };
        assert_eq!(domain.parent(1), Some(7));
        assert_eq!(domain.parent(2), None);
    }

    #[test]
    fn test_domain_serialization() {
        let domain = ClockDomain {
            name: "uart".to_string(),
            rates: RateRepresentation::Continuous { min: 1, max: 2, step: 1 },
            ..ClockDomain::new(1, ProtocolVersion::new(2, 1))
        };
        let json = serde_json::to_string(&domain).unwrap();
        let decoded: ClockDomain = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, domain);
    }
}
