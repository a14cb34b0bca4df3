//! Domain discovery
//!
//! Runs once at startup. Mandatory facts (protocol attributes, per-domain
//! base attributes, rate shape) are fetched first; optional refinements
//! (extended name, parents, permissions) are best-effort and fall back to
//! defaults on failure.

use bytes::BytesMut;
use tracing::{debug, error, warn};

use crate::core::{ClockId, EngineConfig, Error, ProtocolVersion, Result};
use crate::protocol::codec::{self, clock_attr, describe_rates, permissions, possible_parents};
use crate::protocol::iterator::{self, PageState, Paginated};
use crate::protocol::message::{
    expect_len, ClockAttributesResponse, ClockIdRequest, Command, PagedRequest,
    ProtocolAttributesResponse, WordResponse, PAGE_HEADER_SIZE, PARENT_ENTRY_SIZE,
    RATE_ENTRY_SIZE,
};
use crate::transport::{Transport, XferGuard};
use super::domain::{ClockDomain, ProtocolAttributes, RateRepresentation};

/// Items in a well-formed range reply: min, max, step
const RANGE_TRIPLET: u32 = 3;

/// DESCRIBE_RATES pager
struct RateDescriber {
    id: ClockId,
    /// Format of the first reply; later pages must agree
    discrete: Option<bool>,
}

impl Paginated for RateDescriber {
    type Item = u64;

    const MESSAGE_ID: u8 = Command::DescribeRates.id();
    const REQUEST_SIZE: usize = PagedRequest::SIZE;
    const HEADER_SIZE: usize = PAGE_HEADER_SIZE;
    const ITEM_SIZE: usize = RATE_ENTRY_SIZE;

    fn prepare(&self, resume_index: u32, tx: &mut BytesMut) {
        PagedRequest { id: self.id, resume_index }.encode(tx);
    }

    fn update_state(&mut self, rx: &[u8]) -> Result<PageState> {
        expect_len(rx, PAGE_HEADER_SIZE, "DESCRIBE_RATES")?;
        let flags = codec::u32_at(rx, 0);
        let mut state = PageState {
            returned: describe_rates::NUM_RETURNED.get(flags),
            remaining: describe_rates::NUM_REMAINING.get(flags),
        };
        let discrete = !describe_rates::RANGE_FORMAT.is_set(flags);

        match self.discrete {
            Some(previous) if previous != discrete => {
                return Err(Error::protocol(format!(
                    "clock {} switched rate format mid-enumeration",
                    self.id
                )));
            }
            _ => self.discrete = Some(discrete),
        }

        if !discrete && (state.returned != RANGE_TRIPLET || state.remaining != 0) {
            warn!(
                clock_id = self.id,
                returned = state.returned,
                remaining = state.remaining,
                rx_len = rx.len(),
                "malformed DESCRIBE_RATES range reply"
            );

            // firmware miscounting a triplet it did send in full; a count of
            // two is never trusted
            let triplet_len = PAGE_HEADER_SIZE + RATE_ENTRY_SIZE * RANGE_TRIPLET as usize;
            if state.returned != RANGE_TRIPLET
                && state.returned != 2
                && state.remaining == 0
                && rx.len() == triplet_len
            {
                state.returned = RANGE_TRIPLET;
            } else {
                error!(clock_id = self.id, "cannot repair DESCRIBE_RATES range reply");
                return Err(Error::protocol(format!(
                    "clock {} range reply with returned {} remaining {}",
                    self.id, state.returned, state.remaining
                )));
            }
        }

        Ok(state)
    }

    fn process_item(&mut self, rx: &[u8], local_offset: usize) -> Result<u64> {
        Ok(codec::rate_at(rx, PAGE_HEADER_SIZE + local_offset * RATE_ENTRY_SIZE))
    }
}

/// POSSIBLE_PARENTS_GET pager
struct ParentEnumerator {
    id: ClockId,
}

impl Paginated for ParentEnumerator {
    type Item = ClockId;

    const MESSAGE_ID: u8 = Command::PossibleParentsGet.id();
    const REQUEST_SIZE: usize = PagedRequest::SIZE;
    const HEADER_SIZE: usize = PAGE_HEADER_SIZE;
    const ITEM_SIZE: usize = PARENT_ENTRY_SIZE;

    fn prepare(&self, resume_index: u32, tx: &mut BytesMut) {
        PagedRequest { id: self.id, resume_index }.encode(tx);
    }

    fn update_state(&mut self, rx: &[u8]) -> Result<PageState> {
        expect_len(rx, PAGE_HEADER_SIZE, "POSSIBLE_PARENTS_GET")?;
        let flags = codec::u32_at(rx, 0);
        Ok(PageState {
            returned: possible_parents::NUM_RETURNED.get(flags),
            remaining: possible_parents::NUM_REMAINING.get(flags),
        })
    }

    fn process_item(&mut self, rx: &[u8], local_offset: usize) -> Result<ClockId> {
        Ok(codec::u32_at(rx, PAGE_HEADER_SIZE + local_offset * PARENT_ENTRY_SIZE))
    }
}

/// Fetches the protocol-wide attributes
pub(crate) fn fetch_protocol_attributes<T: Transport + ?Sized>(
    transport: &T,
) -> Result<ProtocolAttributes> {
    let mut xfer = XferGuard::new(
        transport,
        Command::ProtocolAttributes.id(),
        0,
        ProtocolAttributesResponse::SIZE,
    )?;
    xfer.send()?;

    let resp = ProtocolAttributesResponse::decode(xfer.rx())?;
    Ok(ProtocolAttributes {
        clock_count: resp.num_clocks,
        max_async_requests: resp.max_async_requests,
    })
}

/// Discovers one domain; failures leave it absent or degrade optional fields
pub(crate) fn discover_domain<T: Transport + ?Sized>(
    transport: &T,
    id: ClockId,
    version: ProtocolVersion,
    config: &EngineConfig,
) -> ClockDomain {
    let mut domain = ClockDomain::new(id, version);

    if let Err(e) = fetch_attributes(transport, &mut domain, version, config) {
        warn!(clock_id = id, error = %e, "clock attributes unavailable");
        return ClockDomain::new(id, version);
    }

    match enumerate_rates(transport, id, config) {
        Ok(rates) => domain.rates = rates,
        Err(e) => {
            warn!(clock_id = id, error = %e, "rate enumeration failed");
            domain.name.clear();
        }
    }

    domain
}

/// Base attributes plus the refinements they advertise
fn fetch_attributes<T: Transport + ?Sized>(
    transport: &T,
    domain: &mut ClockDomain,
    version: ProtocolVersion,
    config: &EngineConfig,
) -> Result<()> {
    let id = domain.id;
    let attributes = {
        let mut xfer = XferGuard::new(
            transport,
            Command::ClockAttributes.id(),
            ClockIdRequest::SIZE,
            ClockAttributesResponse::SIZE,
        )?;
        ClockIdRequest { id }.encode(xfer.tx_mut());
        xfer.send()?;

        let resp = ClockAttributesResponse::decode(xfer.rx())?;
        domain.name = resp.name;
        // the latency field only exists from major revision 2
        domain.enable_latency = if version.major >= 2 {
            resp.enable_latency.filter(|&latency| latency != 0)
        } else {
            None
        };
        resp.attributes
    };

    if version.major < 2 {
        return Ok(());
    }

    if clock_attr::EXTENDED_NAMES.is_set(attributes) {
        match transport.extended_name(Command::NameGet.id(), id, config.extended_name_len) {
            Ok(name) if !name.is_empty() => domain.name = name,
            Ok(_) => {}
            Err(e) => debug!(clock_id = id, error = %e, "keeping short name"),
        }
    }

    domain.rate_changed_notifications = clock_attr::RATE_CHANGED_NOTIF.is_set(attributes);
    domain.rate_change_requested_notifications =
        clock_attr::RATE_CHANGE_REQUESTED_NOTIF.is_set(attributes);

    if clock_attr::PARENT_CLOCK.is_set(attributes) {
        let mut pager = ParentEnumerator { id };
        match iterator::run(transport, &mut pager, config.rx_buffer_size, config.parent_cap()) {
            Ok(parents) => domain.parents = parents,
            Err(e) => warn!(clock_id = id, error = %e, "parent enumeration failed"),
        }
    }

    if clock_attr::GET_PERMISSIONS.is_set(attributes) {
        match fetch_permissions(transport, id) {
            Ok(perm) => {
                domain.state_control_forbidden = !permissions::STATE_CONTROL_ALLOWED.is_set(perm);
                domain.rate_control_forbidden = !permissions::RATE_CONTROL_ALLOWED.is_set(perm);
                domain.parent_control_forbidden =
                    !permissions::PARENT_CONTROL_ALLOWED.is_set(perm);
            }
            Err(e) => warn!(clock_id = id, error = %e, "permissions unavailable, assuming full control"),
        }
    }

    Ok(())
}

fn fetch_permissions<T: Transport + ?Sized>(transport: &T, id: ClockId) -> Result<u32> {
    let mut xfer = XferGuard::new(
        transport,
        Command::GetPermissions.id(),
        ClockIdRequest::SIZE,
        WordResponse::SIZE,
    )?;
    ClockIdRequest { id }.encode(xfer.tx_mut());
    xfer.send()?;
    WordResponse::decode(xfer.rx(), "GET_PERMISSIONS")
}

/// Enumerates the rate shape of a domain
fn enumerate_rates<T: Transport + ?Sized>(
    transport: &T,
    id: ClockId,
    config: &EngineConfig,
) -> Result<RateRepresentation> {
    let mut pager = RateDescriber { id, discrete: None };
    let mut rates = iterator::run(transport, &mut pager, config.rx_buffer_size, config.max_rates)?;

    if pager.discrete.unwrap_or(true) {
        rates.sort_unstable();
        return Ok(RateRepresentation::Discrete(rates));
    }

    match rates[..] {
        [min, max, step] => {
            debug!(clock_id = id, min, max, step, "continuous rate range");
            Ok(RateRepresentation::Continuous { min, max, step })
        }
        _ => Err(Error::protocol(format!(
            "clock {} range reply carried {} entries",
            id,
            rates.len()
        ))),
    }
}
