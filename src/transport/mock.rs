//! Scripted transport for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use super::{Transfer, Transport};
use crate::core::{ClockId, CompletionMode, Error, ProtocolVersion, Result};

type Handler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// A request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sent {
    pub message_id: u8,
    pub tx: Vec<u8>,
    pub mode: CompletionMode,
    pub ack: bool,
}

pub(crate) struct MockTransport {
    version: ProtocolVersion,
    queued: Mutex<HashMap<u8, VecDeque<Vec<u8>>>>,
    handlers: Mutex<HashMap<u8, Handler>>,
    failing: Mutex<HashMap<u8, String>>,
    names: Mutex<HashMap<ClockId, String>>,
    failing_names: Mutex<HashSet<ClockId>>,
    gates: Mutex<HashMap<u8, Arc<Barrier>>>,
    sent: Mutex<Vec<Sent>>,
    allocations: AtomicUsize,
    releases: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new(version: ProtocolVersion) -> Self {
        MockTransport {
            version,
            queued: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            failing_names: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            allocations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Queues one response for `message_id`
    pub(crate) fn push(&self, message_id: u8, rx: Vec<u8>) {
        self.queued
            .lock()
            .unwrap()
            .entry(message_id)
            .or_default()
            .push_back(rx);
    }

    /// Answers every `message_id` request by calling `handler` with the payload
    pub(crate) fn handle<F>(&self, message_id: u8, handler: F)
    where
        F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(message_id, Box::new(handler));
    }

    /// Fails every `message_id` request with a transport error
    pub(crate) fn fail(&self, message_id: u8, msg: &str) {
        self.failing.lock().unwrap().insert(message_id, msg.to_string());
    }

    pub(crate) fn set_name(&self, id: ClockId, name: &str) {
        self.names.lock().unwrap().insert(id, name.to_string());
    }

    pub(crate) fn fail_name(&self, id: ClockId) {
        self.failing_names.lock().unwrap().insert(id);
    }

    /// Holds every `message_id` request until `barrier` trips
    pub(crate) fn gate(&self, message_id: u8, barrier: Arc<Barrier>) {
        self.gates.lock().unwrap().insert(message_id, barrier);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_for(&self, message_id: u8) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.message_id == message_id)
            .collect()
    }

    pub(crate) fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub(crate) fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn exchange(&self, xfer: &mut Transfer, ack: bool) -> Result<()> {
        let message_id = xfer.message_id();
        self.sent.lock().unwrap().push(Sent {
            message_id,
            tx: xfer.tx().to_vec(),
            mode: xfer.mode(),
            ack,
        });

        let gate = self.gates.lock().unwrap().get(&message_id).cloned();
        if let Some(barrier) = gate {
            barrier.wait();
        }

        if let Some(msg) = self.failing.lock().unwrap().get(&message_id) {
            return Err(Error::transport(msg.clone()));
        }

        if let Some(handler) = self.handlers.lock().unwrap().get(&message_id) {
            let rx = handler(xfer.tx())?;
            xfer.set_rx(rx);
            return Ok(());
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&message_id)
            .and_then(|q| q.pop_front());
        match queued {
            Some(rx) => {
                xfer.set_rx(rx);
                Ok(())
            }
            None => Err(Error::transport(format!(
                "no scripted response for message 0x{:x}",
                message_id
            ))),
        }
    }
}

impl Transport for MockTransport {
    fn version(&self) -> Result<ProtocolVersion> {
        Ok(self.version)
    }

    fn allocate(&self, message_id: u8, tx_size: usize, rx_size: usize) -> Result<Transfer> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(Transfer::new(message_id, tx_size, rx_size))
    }

    fn send_and_wait(&self, xfer: &mut Transfer) -> Result<()> {
        self.exchange(xfer, false)
    }

    fn send_and_wait_for_ack(&self, xfer: &mut Transfer) -> Result<()> {
        self.exchange(xfer, true)
    }

    fn release(&self, _xfer: Transfer) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn extended_name(&self, _message_id: u8, id: ClockId, max_len: usize) -> Result<String> {
        if self.failing_names.lock().unwrap().contains(&id) {
            return Err(Error::transport("name fetch failed"));
        }
        let mut name = self
            .names
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::protocol("no extended name"))?;
        name.truncate(max_len);
        Ok(name)
    }
}
