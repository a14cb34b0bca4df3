//! SCMI Clock: client-side engine for a firmware-managed clock control protocol
//!
//! This library discovers the clock domains a firmware controller exposes,
//! decodes their rates, parents and permissions into an immutable domain
//! table, and drives rate, gate, parent and vendor configuration changes over
//! a caller-supplied command/response [`Transport`].
pub mod clock;
pub mod core;
pub mod protocol;
pub mod transport;

// Re-export commonly used items
pub use crate::clock::{
    ClockDomain, ClockEvent, ClockProtocol, ConfigVariant, ProtocolAttributes, RateChangeReport,
    RateRepresentation,
};
pub use crate::core::{
    ClockId, ClockState, CompletionMode, EngineConfig, Error, ProtocolVersion, Result,
};
pub use crate::transport::{Transfer, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
