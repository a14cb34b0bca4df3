//! Command dispatcher
//!
//! Every entry point range-checks the domain id first, then consults the
//! permission flags discovered at startup before touching the transport.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, error};

use crate::core::{ClockId, ClockState, CompletionMode, Error, ProtocolVersion, Result};
use crate::protocol::codec::{clock_attr, config, rate_set};
use crate::protocol::message::{
    ClockAttributesResponse, ClockIdRequest, Command, ConfigGetRequest, ConfigGetResponse,
    ConfigSetRequest, ConfigSetV2Request, ParentSetRequest, RateGetResponse, RateSetComplete,
    RateSetRequest, WordResponse,
};
use crate::transport::{Transport, XferGuard};
use super::ClockProtocol;

/// Shape of the configuration get/set messages, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigVariant {
    /// State-only CONFIG_SET; state read back through CLOCK_ATTRIBUTES
    Legacy,
    /// CONFIG_SET/CONFIG_GET with the OEM sub-channel (revision 2.1+)
    V2,
}

/// Decoded configuration reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigReading {
    attributes: u32,
    enabled: bool,
    oem_value: u32,
}

impl ConfigVariant {
    /// Picks the variant for a negotiated revision
    pub fn for_version(version: ProtocolVersion) -> Self {
        if version.at_least(2, 1) {
            ConfigVariant::V2
        } else {
            ConfigVariant::Legacy
        }
    }

    /// Returns true when the OEM sub-channel is available
    pub fn supports_oem(&self) -> bool {
        matches!(self, ConfigVariant::V2)
    }

    fn set<T: Transport + ?Sized>(
        self,
        transport: &T,
        id: ClockId,
        state: ClockState,
        oem_type: u8,
        oem_value: u32,
        mode: CompletionMode,
    ) -> Result<()> {
        match self {
            ConfigVariant::Legacy => {
                if matches!(state, ClockState::Reserved | ClockState::Unchanged) {
                    return Err(Error::invalid_argument(format!(
                        "state {:?} not expressible in legacy CONFIG_SET",
                        state
                    )));
                }

                let mut xfer =
                    XferGuard::new(transport, Command::ConfigSet.id(), ConfigSetRequest::SIZE, 0)?;
                xfer.set_mode(mode);
                ConfigSetRequest { id, attributes: state.bits() }.encode(xfer.tx_mut());
                xfer.send()
            }
            ConfigVariant::V2 => {
                if state == ClockState::Reserved
                    || (oem_type == config::NULL_OEM_TYPE && state == ClockState::Unchanged)
                {
                    return Err(Error::invalid_argument(format!(
                        "state {:?} with OEM type {}",
                        state, oem_type
                    )));
                }

                let mut xfer = XferGuard::new(
                    transport,
                    Command::ConfigSet.id(),
                    ConfigSetV2Request::SIZE,
                    0,
                )?;
                xfer.set_mode(mode);
                let attributes =
                    config::OEM_TYPE_SET.prep(oem_type as u32) | config::STATE.prep(state.bits());
                // the value is cleared unless an OEM type is carried
                let oem_value = if oem_type == config::NULL_OEM_TYPE { 0 } else { oem_value };
                ConfigSetV2Request { id, attributes, oem_value }.encode(xfer.tx_mut());
                xfer.send()
            }
        }
    }

    fn get<T: Transport + ?Sized>(
        self,
        transport: &T,
        id: ClockId,
        oem_type: u8,
        mode: CompletionMode,
    ) -> Result<ConfigReading> {
        match self {
            ConfigVariant::Legacy => {
                let mut xfer = XferGuard::new(
                    transport,
                    Command::ClockAttributes.id(),
                    ClockIdRequest::SIZE,
                    ClockAttributesResponse::SIZE,
                )?;
                xfer.set_mode(mode);
                ClockIdRequest { id }.encode(xfer.tx_mut());
                xfer.send()?;

                let resp = ClockAttributesResponse::decode(xfer.rx())?;
                Ok(ConfigReading {
                    attributes: resp.attributes,
                    enabled: clock_attr::ENABLED.is_set(resp.attributes),
                    oem_value: 0,
                })
            }
            ConfigVariant::V2 => {
                let mut xfer = XferGuard::new(
                    transport,
                    Command::ConfigGet.id(),
                    ConfigGetRequest::SIZE,
                    ConfigGetResponse::SIZE,
                )?;
                xfer.set_mode(mode);
                ConfigGetRequest { id, flags: config::OEM_TYPE_GET.prep(oem_type as u32) }
                    .encode(xfer.tx_mut());
                xfer.send()?;

                let resp = ConfigGetResponse::decode(xfer.rx())?;
                Ok(ConfigReading {
                    attributes: resp.attributes,
                    enabled: config::ENABLED.is_set(resp.config),
                    oem_value: if oem_type == config::NULL_OEM_TYPE { 0 } else { resp.oem_value },
                })
            }
        }
    }
}

/// Advisory slot in the outstanding asynchronous rate-change budget
///
/// Increment and compare are not one atomic step, so concurrent callers may
/// briefly overshoot the bound by one. The count is returned on drop.
struct AsyncAdmission<'a> {
    counter: Option<&'a AtomicU32>,
    admitted: bool,
}

impl<'a> AsyncAdmission<'a> {
    fn acquire(counter: &'a AtomicU32, max: u8) -> Self {
        if max == 0 {
            return AsyncAdmission { counter: None, admitted: false };
        }

        let before = counter.fetch_add(1, Ordering::AcqRel);
        AsyncAdmission {
            counter: Some(counter),
            admitted: before < max as u32,
        }
    }
}

impl Drop for AsyncAdmission<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.counter {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl<T: Transport> ClockProtocol<T> {
    /// Reads the current rate of a domain in Hz
    pub fn get_rate(&self, id: ClockId) -> Result<u64> {
        self.domain(id)?;

        let mut xfer = XferGuard::new(
            &self.transport,
            Command::RateGet.id(),
            ClockIdRequest::SIZE,
            RateGetResponse::SIZE,
        )?;
        ClockIdRequest { id }.encode(xfer.tx_mut());
        xfer.send()?;
        RateGetResponse::decode(xfer.rx())
    }

    /// Requests a new rate in Hz
    ///
    /// While the firmware's asynchronous budget has room the request is sent
    /// asynchronously and the call waits for the delayed acknowledgement,
    /// whose echoed clock id must match.
    pub fn set_rate(&self, id: ClockId, rate: u64, mode: CompletionMode) -> Result<()> {
        let domain = self.domain(id)?;
        if domain.rate_control_forbidden {
            return Err(Error::permission_denied(format!("rate control of clock {}", id)));
        }

        let mut xfer = XferGuard::new(
            &self.transport,
            Command::RateSet.id(),
            RateSetRequest::SIZE,
            RateSetComplete::SIZE,
        )?;
        let admission =
            AsyncAdmission::acquire(&self.outstanding_async, self.attributes.max_async_requests);

        let flags = if admission.admitted { rate_set::ASYNC.prep(1) } else { 0 };
        xfer.set_mode(mode);
        RateSetRequest { flags, id, rate }.encode(xfer.tx_mut());

        if !admission.admitted {
            return xfer.send();
        }

        xfer.send_for_ack()?;
        let resp = RateSetComplete::decode(xfer.rx())?;
        if resp.id != id {
            error!(clock_id = id, echoed = resp.id, "async rate-set acknowledged for wrong clock");
            return Err(Error::protocol(format!(
                "rate-set completion for clock {} while setting clock {}",
                resp.id, id
            )));
        }
        debug!(clock_id = id, rate = resp.rate, "async rate set");
        Ok(())
    }

    /// Gates or ungates a domain
    pub fn set_state(&self, id: ClockId, state: ClockState, mode: CompletionMode) -> Result<()> {
        let domain = self.domain(id)?;
        if domain.state_control_forbidden {
            return Err(Error::permission_denied(format!("state control of clock {}", id)));
        }

        self.config_variant
            .set(&self.transport, id, state, config::NULL_OEM_TYPE, 0, mode)
    }

    /// Ungates a domain
    pub fn enable(&self, id: ClockId, mode: CompletionMode) -> Result<()> {
        self.set_state(id, ClockState::Enabled, mode)
    }

    /// Gates a domain
    pub fn disable(&self, id: ClockId, mode: CompletionMode) -> Result<()> {
        self.set_state(id, ClockState::Disabled, mode)
    }

    /// Reads whether a domain is currently enabled
    pub fn get_state(&self, id: ClockId, mode: CompletionMode) -> Result<bool> {
        self.domain(id)?;

        let reading = self
            .config_variant
            .get(&self.transport, id, config::NULL_OEM_TYPE, mode)?;
        Ok(reading.enabled)
    }

    /// Writes a vendor-defined configuration value, leaving the gate untouched
    pub fn set_oem_config(
        &self,
        id: ClockId,
        oem_type: u8,
        oem_value: u32,
        mode: CompletionMode,
    ) -> Result<()> {
        self.domain(id)?;
        self.require_oem()?;

        self.config_variant
            .set(&self.transport, id, ClockState::Unchanged, oem_type, oem_value, mode)
    }

    /// Reads a vendor-defined configuration value and the config attributes
    pub fn get_oem_config(
        &self,
        id: ClockId,
        oem_type: u8,
        mode: CompletionMode,
    ) -> Result<(u32, u32)> {
        self.domain(id)?;
        self.require_oem()?;
        if oem_type == config::NULL_OEM_TYPE {
            return Err(Error::invalid_argument("OEM config query without an OEM type"));
        }

        let reading = self.config_variant.get(&self.transport, id, oem_type, mode)?;
        Ok((reading.oem_value, reading.attributes))
    }

    /// Selects the parent at `selector` in the domain's parent list
    pub fn set_parent(&self, id: ClockId, selector: usize, mode: CompletionMode) -> Result<()> {
        let domain = self.domain(id)?;
        let parent_id = domain.parent(selector).ok_or_else(|| {
            Error::invalid_argument(format!(
                "parent selector {} out of range for clock {} ({} parents)",
                selector,
                id,
                domain.parents.len()
            ))
        })?;
        if domain.parent_control_forbidden {
            return Err(Error::permission_denied(format!("parent control of clock {}", id)));
        }

        let mut xfer =
            XferGuard::new(&self.transport, Command::ParentSet.id(), ParentSetRequest::SIZE, 0)?;
        xfer.set_mode(mode);
        ParentSetRequest { id, parent_id }.encode(xfer.tx_mut());
        xfer.send()
    }

    /// Reads the domain id of the current parent
    pub fn get_parent(&self, id: ClockId) -> Result<ClockId> {
        self.domain(id)?;

        let mut xfer = XferGuard::new(
            &self.transport,
            Command::ParentGet.id(),
            ClockIdRequest::SIZE,
            WordResponse::SIZE,
        )?;
        ClockIdRequest { id }.encode(xfer.tx_mut());
        xfer.send()?;
        WordResponse::decode(xfer.rx(), "PARENT_GET")
    }

    fn require_oem(&self) -> Result<()> {
        if !self.config_variant.supports_oem() {
            return Err(Error::unsupported(format!(
                "OEM configuration needs revision 2.1, firmware speaks {}",
                self.version
            )));
        }
        Ok(())
    }
}
