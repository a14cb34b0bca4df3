//! Core types for the clock protocol engine
//!
//! This module contains the error type, shared value types and the engine
//! configuration used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    ClockId,
    ClockState,
    CompletionMode,
    EngineConfig,
    ProtocolVersion,
};

/// Highest protocol revision whose message shapes this engine knows
pub const SUPPORTED_VERSION: ProtocolVersion = ProtocolVersion::new(2, 1);

/// Size of the NUL-padded short name carried in clock attributes
pub const SHORT_NAME_SIZE: usize = 16;

/// Maximum size of an extended clock name
pub const MAX_NAME_SIZE: usize = 64;

/// Default cap on enumerated discrete rates per domain
pub const MAX_NUM_RATES: usize = 16;
