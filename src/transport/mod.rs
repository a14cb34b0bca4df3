//! Transport collaborator seam
//!
//! The engine never moves bytes itself. Everything that allocates, sends,
//! waits for, and releases a command goes through [`Transport`]; the engine
//! only fills request payloads and decodes response payloads.

use std::mem;
use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};

use crate::core::{ClockId, CompletionMode, ProtocolVersion, Result};

#[cfg(test)]
pub(crate) mod mock;

/// One command/response exchange
#[derive(Debug, Clone)]
pub struct Transfer {
    message_id: u8,
    tx: BytesMut,
    rx: Bytes,
    rx_capacity: usize,
    mode: CompletionMode,
}

impl Transfer {
    /// Creates a transfer with room for `tx_size` request bytes and up to
    /// `rx_capacity` response bytes
    pub fn new(message_id: u8, tx_size: usize, rx_capacity: usize) -> Self {
        Transfer {
            message_id,
            tx: BytesMut::with_capacity(tx_size),
            rx: Bytes::new(),
            rx_capacity,
            mode: CompletionMode::Sleeping,
        }
    }

    /// Command id carried in the message header
    pub fn message_id(&self) -> u8 {
        self.message_id
    }

    /// Request payload
    pub fn tx(&self) -> &[u8] {
        &self.tx
    }

    /// Mutable request payload, for encoding
    pub fn tx_mut(&mut self) -> &mut BytesMut {
        &mut self.tx
    }

    /// Response payload as received; its length is the received length
    pub fn rx(&self) -> &[u8] {
        &self.rx
    }

    /// Maximum response size the caller expects
    pub fn rx_capacity(&self) -> usize {
        self.rx_capacity
    }

    /// Stores the received response
    pub fn set_rx(&mut self, rx: impl Into<Bytes>) {
        self.rx = rx.into();
    }

    /// Completion mode requested for this exchange
    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Selects polled or sleeping completion
    pub fn set_mode(&mut self, mode: CompletionMode) {
        self.mode = mode;
    }

    /// Clears both payloads so the transfer can carry the next page
    pub fn reset(&mut self) {
        self.tx.clear();
        self.rx = Bytes::new();
    }
}

/// Command/response transport owned by the platform
pub trait Transport: Send + Sync {
    /// Protocol revision negotiated with the firmware
    fn version(&self) -> Result<ProtocolVersion>;

    /// Allocates a transfer; `rx_size` 0 asks for the transport maximum
    fn allocate(&self, message_id: u8, tx_size: usize, rx_size: usize) -> Result<Transfer> {
        Ok(Transfer::new(message_id, tx_size, rx_size))
    }

    /// Sends the request and waits for the immediate response
    fn send_and_wait(&self, xfer: &mut Transfer) -> Result<()>;

    /// Sends the request and additionally waits for the delayed response
    /// of an asynchronous command, which replaces the response payload
    fn send_and_wait_for_ack(&self, xfer: &mut Transfer) -> Result<()>;

    /// Returns the transfer to the transport
    fn release(&self, xfer: Transfer) {
        drop(xfer);
    }

    /// Fetches the extended name of `id` with the given name command
    fn extended_name(&self, message_id: u8, id: ClockId, max_len: usize) -> Result<String>;
}

/// Releases its transfer back to the transport when dropped
pub(crate) struct XferGuard<'t, T: Transport + ?Sized> {
    transport: &'t T,
    xfer: Transfer,
}

impl<'t, T: Transport + ?Sized> XferGuard<'t, T> {
    /// Allocates a transfer that is released on every exit path
    pub(crate) fn new(
        transport: &'t T,
        message_id: u8,
        tx_size: usize,
        rx_size: usize,
    ) -> Result<Self> {
        let xfer = transport.allocate(message_id, tx_size, rx_size)?;
        Ok(XferGuard { transport, xfer })
    }

    pub(crate) fn send(&mut self) -> Result<()> {
        let transport = self.transport;
        transport.send_and_wait(self)
    }

    pub(crate) fn send_for_ack(&mut self) -> Result<()> {
        let transport = self.transport;
        transport.send_and_wait_for_ack(self)
    }
}

impl<T: Transport + ?Sized> Deref for XferGuard<'_, T> {
    type Target = Transfer;

    fn deref(&self) -> &Transfer {
        &self.xfer
    }
}

impl<T: Transport + ?Sized> DerefMut for XferGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Transfer {
        &mut self.xfer
    }
}

impl<T: Transport + ?Sized> Drop for XferGuard<'_, T> {
    fn drop(&mut self) {
        let xfer = mem::replace(&mut self.xfer, Transfer::new(0, 0, 0));
        self.transport.release(xfer);
    }
}
