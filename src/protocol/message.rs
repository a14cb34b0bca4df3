use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::core::{ClockId, Error, Result, SHORT_NAME_SIZE};
use super::codec::{self, get_rate, put_rate};

/// Command identifiers of the clock protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    ProtocolAttributes = 0x1,
    ClockAttributes = 0x3,
    DescribeRates = 0x4,
    RateSet = 0x5,
    RateGet = 0x6,
    ConfigSet = 0x7,
    NameGet = 0x8,
    RateNotify = 0x9,
    RateChangeRequestedNotify = 0xA,
    ConfigGet = 0xB,
    PossibleParentsGet = 0xC,
    ParentSet = 0xD,
    ParentGet = 0xE,
    GetPermissions = 0xF,
}

impl Command {
    /// Wire message id
    pub const fn id(self) -> u8 {
        self as u8
    }
}

/// Checks that a response buffer carries at least `need` bytes
pub(crate) fn expect_len(buf: &[u8], need: usize, what: &str) -> Result<()> {
    if buf.len() < need {
        return Err(Error::protocol(format!(
            "{} reply too short: {} bytes, expected {}",
            what,
            buf.len(),
            need
        )));
    }
    Ok(())
}

/// PROTOCOL_ATTRIBUTES response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAttributesResponse {
    pub num_clocks: u16,
    pub max_async_requests: u8,
}

impl ProtocolAttributesResponse {
    pub const SIZE: usize = 4;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len(buf, Self::SIZE, "PROTOCOL_ATTRIBUTES")?;
        let mut src = buf;
        let num_clocks = src.get_u16_le();
        let max_async_requests = src.get_u8();
        Ok(ProtocolAttributesResponse { num_clocks, max_async_requests })
    }
}

/// Any request whose only payload is the clock id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockIdRequest {
    pub id: ClockId,
}

impl ClockIdRequest {
    pub const SIZE: usize = 4;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
    }
}

/// CLOCK_ATTRIBUTES response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockAttributesResponse {
    pub attributes: u32,
    pub name: String,
    /// Absent on revisions that predate the field
    pub enable_latency: Option<u32>,
}

impl ClockAttributesResponse {
    /// attributes + short name
    pub const MIN_SIZE: usize = 4 + SHORT_NAME_SIZE;
    /// attributes + short name + enable latency
    pub const SIZE: usize = Self::MIN_SIZE + 4;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len(buf, Self::MIN_SIZE, "CLOCK_ATTRIBUTES")?;
        let attributes = codec::u32_at(buf, 0);
        let name = codec::decode_name(&buf[4..Self::MIN_SIZE]);
        let enable_latency = if buf.len() >= Self::SIZE {
            Some(codec::u32_at(buf, Self::MIN_SIZE))
        } else {
            None
        };
        Ok(ClockAttributesResponse { attributes, name, enable_latency })
    }
}

/// Request of the two paginated commands: clock id plus resume index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedRequest {
    pub id: ClockId,
    pub resume_index: u32,
}

impl PagedRequest {
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.resume_index);
    }
}

/// Size of the count header of a paginated reply
pub const PAGE_HEADER_SIZE: usize = 4;
/// Size of one rate entry (low, high)
pub const RATE_ENTRY_SIZE: usize = 8;
/// Size of one parent entry
pub const PARENT_ENTRY_SIZE: usize = 4;

/// RATE_SET request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSetRequest {
    pub flags: u32,
    pub id: ClockId,
    pub rate: u64,
}

impl RateSetRequest {
    pub const SIZE: usize = 16;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.flags);
        dst.put_u32_le(self.id);
        put_rate(dst, self.rate);
    }
}

/// Delayed response acknowledging an asynchronous RATE_SET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSetComplete {
    pub id: ClockId,
    pub rate: u64,
}

impl RateSetComplete {
    pub const SIZE: usize = 12;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len(buf, Self::SIZE, "RATE_SET completion")?;
        let mut src = buf;
        let id = src.get_u32_le();
        let rate = get_rate(&mut src);
        Ok(RateSetComplete { id, rate })
    }
}

/// RATE_GET response
pub struct RateGetResponse;

impl RateGetResponse {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> Result<u64> {
        expect_len(buf, Self::SIZE, "RATE_GET")?;
        Ok(codec::rate_at(buf, 0))
    }
}

/// Legacy CONFIG_SET request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSetRequest {
    pub id: ClockId,
    pub attributes: u32,
}

impl ConfigSetRequest {
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.attributes);
    }
}

/// CONFIG_SET request from revision 2.1 onward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSetV2Request {
    pub id: ClockId,
    pub attributes: u32,
    pub oem_value: u32,
}

impl ConfigSetV2Request {
    pub const SIZE: usize = 12;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.attributes);
        dst.put_u32_le(self.oem_value);
    }
}

/// CONFIG_GET request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigGetRequest {
    pub id: ClockId,
    pub flags: u32,
}

impl ConfigGetRequest {
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.flags);
    }
}

/// CONFIG_GET response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigGetResponse {
    pub attributes: u32,
    pub config: u32,
    pub oem_value: u32,
}

impl ConfigGetResponse {
    pub const SIZE: usize = 12;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len(buf, Self::SIZE, "CONFIG_GET")?;
        let mut src = buf;
        Ok(ConfigGetResponse {
            attributes: src.get_u32_le(),
            config: src.get_u32_le(),
            oem_value: src.get_u32_le(),
        })
    }
}

/// PARENT_SET request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentSetRequest {
    pub id: ClockId,
    pub parent_id: ClockId,
}

impl ParentSetRequest {
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.parent_id);
    }
}

/// Single little-endian word reply (PARENT_GET, GET_PERMISSIONS)
pub struct WordResponse;

impl WordResponse {
    pub const SIZE: usize = 4;

    pub fn decode(buf: &[u8], what: &str) -> Result<u32> {
        expect_len(buf, Self::SIZE, what)?;
        Ok(codec::u32_at(buf, 0))
    }
}

/// RATE_NOTIFY / RATE_CHANGE_REQUESTED_NOTIFY request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateNotifyRequest {
    pub id: ClockId,
    pub enable: bool,
}

impl RateNotifyRequest {
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u32_le(codec::notify::ENABLE.prep(self.enable as u32));
    }
}

/// Raw rate notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateNotifyPayload {
    pub agent_id: u32,
    pub clock_id: ClockId,
    pub rate: u64,
}

impl RateNotifyPayload {
    pub const SIZE: usize = 16;

    /// Decodes a payload of exactly [`Self::SIZE`] bytes
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        let mut src = buf;
        let agent_id = src.get_u32_le();
        let clock_id = src.get_u32_le();
        let rate = get_rate(&mut src);
        Some(RateNotifyPayload { agent_id, clock_id, rate })
    }
}
