//! Paginated retrieval
//!
//! Some replies cannot carry a whole result set. The firmware answers each
//! request with a `returned`/`remaining` pair and the client re-asks from the
//! next resume index until nothing remains. The total is never announced up
//! front, so the destination is sized from the first reply.

use tracing::warn;

use crate::core::{Error, Result};
use crate::transport::{Transport, XferGuard};

/// Page accounting decoded from one reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    /// Items carried by this reply
    pub returned: u32,
    /// Items still to be fetched after this reply
    pub remaining: u32,
}

/// One paginated command
pub trait Paginated {
    /// Decoded element type
    type Item;

    /// Command id of the request
    const MESSAGE_ID: u8;
    /// Request size in bytes
    const REQUEST_SIZE: usize;
    /// Size of the count header preceding the elements
    const HEADER_SIZE: usize;
    /// Size of one element
    const ITEM_SIZE: usize;

    /// Encodes the request resuming at `resume_index`
    fn prepare(&self, resume_index: u32, tx: &mut bytes::BytesMut);

    /// Decodes the page accounting of `rx`
    fn update_state(&mut self, rx: &[u8]) -> Result<PageState>;

    /// Decodes the element at `local_offset` within this page
    fn process_item(&mut self, rx: &[u8], local_offset: usize) -> Result<Self::Item>;
}

/// Drains a paginated command into a vector
///
/// Items land at `resume_index + local_offset`. The loop stops when the
/// firmware reports nothing remaining or `cap` items have been collected.
/// Any failure discards what was collected so far.
pub fn run<T, P>(transport: &T, pager: &mut P, rx_size: usize, cap: usize) -> Result<Vec<P::Item>>
where
    T: Transport + ?Sized,
    P: Paginated,
{
    let mut xfer = XferGuard::new(transport, P::MESSAGE_ID, P::REQUEST_SIZE, rx_size)?;
    let mut items: Vec<P::Item> = Vec::new();
    let mut announced: Option<usize> = None;
    let mut resume_index: usize = 0;

    loop {
        xfer.reset();
        pager.prepare(resume_index as u32, xfer.tx_mut());
        xfer.send()?;

        let state = pager.update_state(xfer.rx())?;
        let returned = state.returned as usize;
        let remaining = state.remaining as usize;

        let total = match announced {
            Some(total) => total,
            None => {
                let total = returned + remaining;
                let limit = total.min(cap);
                items.try_reserve_exact(limit).map_err(|e| {
                    Error::out_of_memory(format!("cannot hold {} items: {}", limit, e))
                })?;
                announced = Some(total);
                total
            }
        };

        if resume_index + returned > total {
            return Err(Error::protocol(format!(
                "reply overruns announced total: index {} + returned {} > {}",
                resume_index, returned, total
            )));
        }

        let need = P::HEADER_SIZE + returned * P::ITEM_SIZE;
        if xfer.rx().len() < need {
            return Err(Error::protocol(format!(
                "truncated page: {} bytes for {} items, expected {}",
                xfer.rx().len(),
                returned,
                need
            )));
        }

        let take = returned.min(cap - resume_index);
        for local_offset in 0..take {
            let item = pager.process_item(xfer.rx(), local_offset)?;
            items.push(item);
        }
        resume_index += take;

        if remaining == 0 {
            break;
        }

        if resume_index >= cap {
            warn!(cap, remaining, "pagination stopped at cap");
            break;
        }

        if returned == 0 {
            return Err(Error::protocol(format!(
                "empty page with {} items remaining",
                remaining
            )));
        }
    }

    Ok(items)
}
