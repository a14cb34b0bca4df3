use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Clock domain identifier, also the index into the domain table
pub type ClockId = u32;

/// Negotiated protocol revision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major revision
    pub major: u16,
    /// Minor revision
    pub minor: u16,
}

impl ProtocolVersion {
    /// Creates a version from its two halves
    pub const fn new(major: u16, minor: u16) -> Self {
        ProtocolVersion { major, minor }
    }

    /// Decodes the packed `major << 16 | minor` word reported by firmware
    pub const fn from_raw(raw: u32) -> Self {
        ProtocolVersion {
            major: (raw >> 16) as u16,
            minor: (raw & 0xffff) as u16,
        }
    }

    /// Packs the version back into its wire word
    pub const fn raw(&self) -> u32 {
        (self.major as u32) << 16 | self.minor as u32
    }

    /// Returns whether this revision is at least `major.minor`
    pub fn at_least(&self, major: u16, minor: u16) -> bool {
        *self >= ProtocolVersion::new(major, minor)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Clock state carried in configuration-set requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ClockState {
    /// Gate the clock
    Disabled = 0,
    /// Ungate the clock
    Enabled = 1,
    /// Reserved encoding, never valid on the wire
    Reserved = 2,
    /// Leave the gate untouched (OEM-only updates)
    Unchanged = 3,
}

impl ClockState {
    /// Wire encoding of the state
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// How the transport should wait for a command to complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionMode {
    /// The caller may be suspended while waiting
    #[default]
    Sleeping,
    /// Busy-poll for completion; usable from atomic context
    Polled,
}

impl CompletionMode {
    /// Returns true for the polled variant
    pub fn is_polled(&self) -> bool {
        matches!(self, CompletionMode::Polled)
    }
}

/// Configuration for the clock protocol engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on the number of rates enumerated per domain
    pub max_rates: usize,
    /// Hard cap on the number of parents enumerated per domain, 0 for none
    pub max_parents: usize,
    /// Maximum length requested from the extended name fetch
    pub extended_name_len: usize,
    /// Response buffer size requested for paginated replies
    pub rx_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_rates: super::MAX_NUM_RATES,
            max_parents: 0,
            extended_name_len: super::MAX_NAME_SIZE,
            rx_buffer_size: 128,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        // a continuous range always arrives as three entries
        if self.max_rates < 3 {
            return Err(Error::config("max_rates must be at least 3"));
        }

        if self.extended_name_len < super::SHORT_NAME_SIZE {
            return Err(Error::config(format!(
                "extended_name_len must be at least {}",
                super::SHORT_NAME_SIZE
            )));
        }

        // one paginated header plus one 64-bit rate entry
        if self.rx_buffer_size < 12 {
            return Err(Error::config("rx_buffer_size too small for a paginated reply"));
        }

        Ok(())
    }

    /// Effective parent cap for the iterator
    pub(crate) fn parent_cap(&self) -> usize {
        if self.max_parents == 0 {
            usize::MAX
        } else {
            self.max_parents
        }
    }
}
