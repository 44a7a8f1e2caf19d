//! Mock PHY adapters to assist with testing

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use ieee802154::mac::ShortAddress;

use crate::error::CoreError;
use crate::frame::{self, Frame};
use super::Phy;

/// Error type for mock adapters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MockError;

pub type MockResult = Result<(), CoreError<MockError>>;

#[derive(Debug, Default)]
struct MockPhyInner {
    powered: bool,
    on_count: usize,
    off_count: usize,
    sent: Vec<Vec<u8>>,
    outcomes: VecDeque<MockResult>,
}

/// Mock PHY, records power state and transmitted frames and returns
/// scripted send outcomes (`Ok` once the script is exhausted)
#[derive(Clone, Debug, Default)]
pub struct MockPhy(Arc<Mutex<MockPhyInner>>);

impl MockPhy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for subsequent `send` calls
    pub fn script(&mut self, outcomes: &[MockResult]) {
        self.0.lock().unwrap().outcomes.extend(outcomes.iter().cloned());
    }

    /// Frames sent since creation or the last `clear`
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn powered(&self) -> bool {
        self.0.lock().unwrap().powered
    }

    /// Number of (on, off) requests received
    pub fn power_cycles(&self) -> (usize, usize) {
        let i = self.0.lock().unwrap();
        (i.on_count, i.off_count)
    }

    pub fn clear(&mut self) {
        let mut i = self.0.lock().unwrap();
        i.sent.clear();
        i.outcomes.clear();
    }
}

impl Phy for MockPhy {
    type Error = MockError;

    fn on(&mut self) -> Result<(), CoreError<Self::Error>> {
        let mut i = self.0.lock().unwrap();
        i.powered = true;
        i.on_count += 1;
        Ok(())
    }

    fn off(&mut self) -> Result<(), CoreError<Self::Error>> {
        let mut i = self.0.lock().unwrap();
        i.powered = false;
        i.off_count += 1;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), CoreError<Self::Error>> {
        let mut i = self.0.lock().unwrap();
        i.sent.push(data.to_vec());
        i.outcomes.pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Debug)]
struct AetherNode {
    addr: ShortAddress,
    powered: bool,
    inbox: VecDeque<Vec<u8>>,
}

/// Shared medium connecting [`AetherPhy`] instances.
///
/// Frames are delivered to every other node that is powered at the time of
/// sending. Frames requesting an acknowledgement succeed when a powered node
/// owns the destination short address, and fail with `NoAck` otherwise.
#[derive(Clone, Debug, Default)]
pub struct Aether(Arc<Mutex<Vec<AetherNode>>>);

impl Aether {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node with the provided short address
    pub fn attach(&self, addr: ShortAddress) -> AetherPhy {
        self.0.lock().unwrap().push(AetherNode{
            addr,
            powered: false,
            inbox: VecDeque::new(),
        });

        AetherPhy{ aether: self.clone(), addr }
    }

    pub fn powered(&self, addr: ShortAddress) -> bool {
        self.0.lock().unwrap().iter().any(|n| n.addr == addr && n.powered)
    }
}

/// PHY attached to an [`Aether`]
#[derive(Clone, Debug)]
pub struct AetherPhy {
    aether: Aether,
    addr: ShortAddress,
}

impl AetherPhy {
    pub fn addr(&self) -> ShortAddress {
        self.addr
    }

    /// Fetch the next frame delivered to this node
    pub fn receive(&mut self) -> Option<Vec<u8>> {
        let mut nodes = self.aether.0.lock().unwrap();
        nodes.iter_mut().find(|n| n.addr == self.addr)
            .and_then(|n| n.inbox.pop_front())
    }

    fn set_powered(&mut self, powered: bool) {
        let mut nodes = self.aether.0.lock().unwrap();
        if let Some(n) = nodes.iter_mut().find(|n| n.addr == self.addr) {
            n.powered = powered;
            if !powered {
                n.inbox.clear();
            }
        }
    }
}

impl Phy for AetherPhy {
    type Error = MockError;

    fn on(&mut self) -> Result<(), CoreError<Self::Error>> {
        self.set_powered(true);
        Ok(())
    }

    fn off(&mut self) -> Result<(), CoreError<Self::Error>> {
        self.set_powered(false);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), CoreError<Self::Error>> {
        let mut nodes = self.aether.0.lock().unwrap();

        for n in nodes.iter_mut().filter(|n| n.addr != self.addr && n.powered) {
            n.inbox.push_back(data.to_vec());
        }

        if frame::ack_request_seq(data).is_none() {
            return Ok(())
        }

        let dest = Frame::decode(data).dest_addr;
        match nodes.iter().any(|n| n.addr == dest && n.powered) {
            true => Ok(()),
            false => Err(CoreError::NoAck),
        }
    }
}
