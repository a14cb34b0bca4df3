//! Clock protocol engine
//!
//! [`ClockProtocol::initialize`] discovers every clock domain once and builds
//! an immutable domain table. Afterwards the dispatcher operations in `ops`
//! and the event adapter in `events` run independently per call; the only
//! state they share is the counter of outstanding asynchronous rate changes.
//!
//! # Examples
//!
//! ```ignore
//! use scmi_clock::{ClockProtocol, CompletionMode, EngineConfig};
//!
//! let clocks = ClockProtocol::initialize(transport, EngineConfig::default())?;
//! for id in 0..clocks.count() as u32 {
//!     if let Some(domain) = clocks.info(id) {
//!         println!("{}: {:?}", domain.name, domain.rates);
//!     }
//! }
//! clocks.set_rate(0, 200_000_000, CompletionMode::Sleeping)?;
//! ```

mod builder;
pub mod domain;
pub mod events;
pub mod ops;

pub use self::domain::{ClockDomain, ProtocolAttributes, RateRepresentation};
pub use self::events::{ClockEvent, EventDescriptor, RateChangeReport, EVENTS, EVENT_QUEUE_SIZE};
pub use self::ops::ConfigVariant;

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::core::{ClockId, EngineConfig, Error, ProtocolVersion, Result, SUPPORTED_VERSION};
use crate::transport::Transport;

/// Client-side engine for one firmware clock protocol instance
pub struct ClockProtocol<T: Transport> {
    transport: T,
    config: EngineConfig,
    version: ProtocolVersion,
    attributes: ProtocolAttributes,
    domains: Vec<ClockDomain>,
    config_variant: ConfigVariant,
    outstanding_async: AtomicU32,
}

impl<T: Transport> ClockProtocol<T> {
    /// Discovers all clock domains and builds the engine
    ///
    /// Only a failure to fetch the protocol attributes (or to allocate the
    /// domain table) is fatal; per-domain failures leave that domain absent
    /// or with default optional fields.
    pub fn initialize(transport: T, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let version = transport.version()?;
        debug!(%version, "clock protocol version");
        if version > SUPPORTED_VERSION {
            warn!(%version, supported = %SUPPORTED_VERSION, "firmware newer than supported revision");
        }

        let attributes = builder::fetch_protocol_attributes(&transport)?;
        debug!(
            clock_count = attributes.clock_count,
            max_async_requests = attributes.max_async_requests,
            "clock protocol attributes"
        );

        let count = attributes.clock_count as usize;
        let mut domains = Vec::new();
        domains.try_reserve_exact(count).map_err(|e| {
            Error::out_of_memory(format!("cannot hold {} clock domains: {}", count, e))
        })?;

        for id in 0..count as ClockId {
            domains.push(builder::discover_domain(&transport, id, version, &config));
        }

        Ok(ClockProtocol {
            transport,
            config,
            version,
            attributes,
            domains,
            config_variant: ConfigVariant::for_version(version),
            outstanding_async: AtomicU32::new(0),
        })
    }

    /// Number of clock domains
    pub fn count(&self) -> usize {
        self.domains.len()
    }

    /// Domain record, or `None` when out of range or absent
    pub fn info(&self, id: ClockId) -> Option<&ClockDomain> {
        self.domains
            .get(id as usize)
            .filter(|domain| domain.is_present())
    }

    /// Iterates over present domains
    pub fn domains(&self) -> impl Iterator<Item = &ClockDomain> {
        self.domains.iter().filter(|domain| domain.is_present())
    }

    /// Negotiated protocol revision
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Protocol-wide attributes
    pub fn attributes(&self) -> ProtocolAttributes {
        self.attributes
    }

    /// Firmware bound on outstanding asynchronous rate changes
    pub fn max_async_requests(&self) -> u8 {
        self.attributes.max_async_requests
    }

    /// Asynchronous rate changes currently in flight
    pub fn outstanding_async_requests(&self) -> u32 {
        self.outstanding_async.load(Ordering::Acquire)
    }

    /// Configuration message variant selected at startup
    pub fn config_variant(&self) -> ConfigVariant {
        self.config_variant
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Range-checked domain lookup used by every dispatcher entry point
    pub(crate) fn domain(&self, id: ClockId) -> Result<&ClockDomain> {
        self.domains.get(id as usize).ok_or(Error::NotFound(id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::CompletionMode;
    use crate::protocol::codec::clock_attr;
    use crate::protocol::message::Command;
    use crate::transport::mock::MockTransport;
    use super::builder::tests::{attributes_reply, discrete_reply, range_reply};

    /// Three domains: 0 discrete, 1 range, 2 fails attribute discovery
    pub(crate) fn scripted(version: ProtocolVersion, max_async: u8) -> MockTransport {
        let mock = MockTransport::new(version);
        mock.push(Command::ProtocolAttributes.id(), vec![3, 0, max_async, 0]);

        mock.push(
            Command::ClockAttributes.id(),
            attributes_reply(clock_attr::RATE_CHANGED_NOTIF.prep(1), "cpu", 30),
        );
        mock.push(Command::DescribeRates.id(), discrete_reply(&[300, 100, 200], 0));

        mock.push(Command::ClockAttributes.id(), attributes_reply(0, "pll", 0));
        mock.push(Command::DescribeRates.id(), range_reply(3, [10, 1_000, 10]));

        mock.push(Command::ClockAttributes.id(), vec![0u8; 2]);
        mock
    }

    pub(crate) fn engine(version: ProtocolVersion, max_async: u8) -> ClockProtocol<MockTransport> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let engine = ClockProtocol::initialize(scripted(version, max_async), EngineConfig::default())
            .unwrap();
        engine.transport().clear_sent();
        engine
    }

    #[test]
    fn test_initialize() {
        let clocks = engine(ProtocolVersion::new(2, 1), 2);

        assert_eq!(clocks.count(), 3);
        assert_eq!(clocks.max_async_requests(), 2);
        assert_eq!(clocks.config_variant(), ConfigVariant::V2);

        let cpu = clocks.info(0).unwrap();
        assert_eq!(cpu.rates, RateRepresentation::Discrete(vec![100, 200, 300]));
        assert_eq!(cpu.enable_latency, Some(30));
        assert!(cpu.rate_changed_notifications);

        let pll = clocks.info(1).unwrap();
        assert_eq!(pll.rates, RateRepresentation::Continuous { min: 10, max: 1_000, step: 10 });

        assert!(clocks.info(2).is_none());
        assert!(clocks.info(3).is_none());
        assert_eq!(clocks.domains().count(), 2);
        assert_eq!(clocks.transport().allocations(), clocks.transport().releases());
    }

    #[test]
    fn test_legacy_variant_selected() {
        let clocks = engine(ProtocolVersion::new(2, 0), 0);
        assert_eq!(clocks.config_variant(), ConfigVariant::Legacy);

        let clocks = engine(ProtocolVersion::new(1, 0), 0);
        assert_eq!(clocks.config_variant(), ConfigVariant::Legacy);
        assert_eq!(clocks.info(0).unwrap().enable_latency, None);
    }

    #[test]
    fn test_newer_firmware_uses_latest_shapes() {
        let clocks = engine(ProtocolVersion::new(3, 0), 0);
        assert_eq!(clocks.protocol_version(), ProtocolVersion::new(3, 0));
        assert_eq!(clocks.config_variant(), ConfigVariant::V2);
        assert_eq!(clocks.info(0).unwrap().enable_latency, Some(30));

        clocks.transport().push(Command::ConfigSet.id(), vec![]);
        clocks
            .set_oem_config(0, 0x10, 5, CompletionMode::Sleeping)
            .unwrap();

        let sent = clocks.transport().sent_for(Command::ConfigSet.id());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tx.len(), 12);
    }

    #[test]
    fn test_protocol_attributes_failure_is_fatal() {
        let mock = MockTransport::new(ProtocolVersion::new(2, 1));
        mock.fail(Command::ProtocolAttributes.id(), "no firmware");

        let err = ClockProtocol::initialize(mock, EngineConfig::default()).err().unwrap();
        assert!(err.is_transport());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mock = MockTransport::new(ProtocolVersion::new(2, 1));
        let config = EngineConfig { max_rates: 1, ..Default::default() };

        let err = ClockProtocol::initialize(mock, config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_lookup_range() {
        let clocks = engine(ProtocolVersion::new(2, 1), 0);
        assert!(clocks.domain(2).is_ok());
        assert_eq!(clocks.domain(3).unwrap_err(), Error::NotFound(3));
    }
}
