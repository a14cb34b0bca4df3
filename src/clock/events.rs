//! Rate notifications
//!
//! Subscriptions are toggled per (event, clock id); the clock id doubles as
//! the notification source id. Raw payloads are turned into typed reports
//! only when their shape is exactly right.

use std::mem;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{ClockId, Error, Result};
use crate::protocol::message::{Command, RateNotifyPayload, RateNotifyRequest};
use crate::transport::{Transport, XferGuard};
use super::ClockProtocol;

/// Depth of the per-protocol notification queue requested from the bus
pub const EVENT_QUEUE_SIZE: usize = 4096;

/// Notification kinds of the clock protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClockEvent {
    /// A rate change completed
    RateChanged = 0,
    /// Another agent requested a rate change
    RateChangeRequested = 1,
}

impl ClockEvent {
    /// Maps a bus event id onto a known kind
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(ClockEvent::RateChanged),
            1 => Some(ClockEvent::RateChangeRequested),
            _ => None,
        }
    }

    /// Command that toggles this notification
    pub fn command(self) -> Command {
        match self {
            ClockEvent::RateChanged => Command::RateNotify,
            ClockEvent::RateChangeRequested => Command::RateChangeRequestedNotify,
        }
    }
}

/// Sizing the notification bus needs for one event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    pub event: ClockEvent,
    pub max_payload_size: usize,
    pub max_report_size: usize,
}

/// Both clock events
pub const EVENTS: [EventDescriptor; 2] = [
    EventDescriptor {
        event: ClockEvent::RateChanged,
        max_payload_size: RateNotifyPayload::SIZE,
        max_report_size: mem::size_of::<RateChangeReport>(),
    },
    EventDescriptor {
        event: ClockEvent::RateChangeRequested,
        max_payload_size: RateNotifyPayload::SIZE,
        max_report_size: mem::size_of::<RateChangeReport>(),
    },
];

/// Typed rate notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateChangeReport {
    #[serde(serialize_with = "crate::core::serde::serialize_time")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_time")]
    pub timestamp: SystemTime,
    pub agent_id: u32,
    pub clock_id: ClockId,
    pub rate: u64,
}

impl RateChangeReport {
    /// Decodes a raw payload; `None` for an unknown event or a malformed payload
    pub fn decode(event_id: u8, payload: &[u8], timestamp: SystemTime) -> Option<Self> {
        ClockEvent::from_id(event_id)?;
        let p = RateNotifyPayload::decode(payload)?;
        Some(RateChangeReport {
            timestamp,
            agent_id: p.agent_id,
            clock_id: p.clock_id,
            rate: p.rate,
        })
    }

    /// Source id the bus routes this report by
    pub fn source_id(&self) -> ClockId {
        self.clock_id
    }
}

impl<T: Transport> ClockProtocol<T> {
    /// Number of notification sources, one per clock domain
    pub fn source_count(&self) -> usize {
        self.count()
    }

    /// Enables or disables one notification kind for one domain
    pub fn set_subscription(&self, event_id: u8, id: ClockId, enable: bool) -> Result<()> {
        let event = ClockEvent::from_id(event_id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown clock event {}", event_id)))?;
        self.domain(id)?;

        let result = self.rate_notify(event, id, enable);
        if let Err(e) = &result {
            debug!(event = ?event, clock_id = id, enable, error = %e, "notification toggle failed");
        }
        result
    }

    /// Decodes a raw notification payload delivered by the bus
    pub fn decode_report(
        &self,
        event_id: u8,
        payload: &[u8],
        timestamp: SystemTime,
    ) -> Option<RateChangeReport> {
        RateChangeReport::decode(event_id, payload, timestamp)
    }

    fn rate_notify(&self, event: ClockEvent, id: ClockId, enable: bool) -> Result<()> {
        let mut xfer = XferGuard::new(
            &self.transport,
            event.command().id(),
            RateNotifyRequest::SIZE,
            0,
        )?;
        RateNotifyRequest { id, enable }.encode(xfer.tx_mut());
        xfer.send()
    }
}
