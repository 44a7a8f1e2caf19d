//! Packet attribute store
//!
//! Key-value attributes describing the frame currently being handled
//! (addressing, sequence number, acknowledgement) and the PHY/MAC timing
//! constants derived from the radio. Upper layers set the attributes before
//! requesting a transmission and read them back when building frames, the
//! MAC temporarily overrides some of them while sending strobes.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::ops::{Deref, DerefMut};

use ieee802154::mac::{ExtendedAddress, ShortAddress};
use strum::{EnumCount, IntoStaticStr};

use crate::log::trace;

pub type AttrValue = u32;

/// Attribute identifiers
#[derive(Debug, Clone, Copy, PartialEq, EnumCount, IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attr {
    MacShortAddr,
    MacPanId,
    MacSeqNo,
    /// Acknowledgement required (0 / 1)
    MacAck,
    /// Derived: `20 * PhySymbolPeriod`
    MacUnitBackoffPeriod,
    /// Derived, in microseconds
    MacAckWaitDuration,
    PhyTurnaroundTime,
    /// Symbol period in microseconds
    PhySymbolPeriod,
    PhySymbolsPerOctet,
    PhyShrDuration,
}

/// Radio timing constants used to seed the attribute store
#[derive(Debug, Clone, PartialEq)]
pub struct PhyTiming {
    pub turnaround_time: AttrValue,
    pub symbol_period_us: AttrValue,
    pub symbols_per_octet: AttrValue,
    pub shr_duration: AttrValue,
}

impl Default for PhyTiming {
    /// 2.4 GHz O-QPSK
    fn default() -> Self {
        Self {
            turnaround_time: 12,
            symbol_period_us: 16,
            symbols_per_octet: 2,
            shr_duration: 10,
        }
    }
}

/// Attribute store for the frame in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    values: [AttrValue; Attr::COUNT],
    receiver: Option<ExtendedAddress>,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            values: [0; Attr::COUNT],
            receiver: None,
        }
    }
}

impl Attributes {
    /// Create an attribute store seeded with the provided PHY timing
    pub fn new(timing: &PhyTiming) -> Self {
        let mut a = Self::default();

        a.set(Attr::PhyTurnaroundTime, timing.turnaround_time);
        a.set(Attr::PhySymbolPeriod, timing.symbol_period_us);
        a.set(Attr::PhySymbolsPerOctet, timing.symbols_per_octet);
        a.set(Attr::PhyShrDuration, timing.shr_duration);

        a
    }

    pub fn get(&self, attr: Attr) -> AttrValue {
        self.values[attr as usize]
    }

    pub fn set(&mut self, attr: Attr, value: AttrValue) {
        let name: &'static str = attr.into();
        trace!("Set attribute {}: {}", name, value);

        self.values[attr as usize] = value;
    }

    pub fn get_bool(&self, attr: Attr) -> bool {
        self.get(attr) != 0
    }

    pub fn set_bool(&mut self, attr: Attr, value: bool) {
        self.set(attr, value as AttrValue)
    }

    /// Receiver of the frame in flight, `None` for broadcast
    pub fn receiver(&self) -> Option<ExtendedAddress> {
        self.receiver
    }

    pub fn set_receiver(&mut self, receiver: Option<ExtendedAddress>) {
        self.receiver = receiver;
    }

    /// Whether the frame in flight is addressed to all nodes
    pub fn holds_broadcast(&self) -> bool {
        match self.receiver {
            None => true,
            Some(a) => a == ExtendedAddress::broadcast(),
        }
    }

    /// Short form of the receiver address (low 16 bits)
    pub fn receiver_short(&self) -> Option<ShortAddress> {
        self.receiver.map(short_address)
    }

    /// Derive the MAC unit backoff period and ack wait duration from the
    /// PHY timing attributes, storing and returning the ack wait duration
    pub fn derive_mac_timing(&mut self) -> AttrValue {
        let symbol_period = self.get(Attr::PhySymbolPeriod);

        let unit_backoff = 20 * symbol_period;
        self.set(Attr::MacUnitBackoffPeriod, unit_backoff);

        let ack_wait = unit_backoff
            + self.get(Attr::PhyTurnaroundTime)
            + self.get(Attr::PhyShrDuration)
            + 6 * self.get(Attr::PhySymbolsPerOctet) * symbol_period;
        self.set(Attr::MacAckWaitDuration, ack_wait);

        ack_wait
    }
}

/// Derive a short address from an extended address
pub fn short_address(a: ExtendedAddress) -> ShortAddress {
    ShortAddress(a.0 as u16)
}

/// Scoped override of the per-frame attributes (sequence number and
/// acknowledgement flag).
///
/// The saved values are written back on [`AttrOverride::restore`] and
/// again on drop, so every exit path leaves the store as it was found.
pub struct AttrOverride<'a> {
    attrs: &'a mut Attributes,
    seq_no: AttrValue,
    ack: AttrValue,
}

impl <'a> AttrOverride<'a> {
    pub fn new(attrs: &'a mut Attributes) -> Self {
        let seq_no = attrs.get(Attr::MacSeqNo);
        let ack = attrs.get(Attr::MacAck);

        Self { attrs, seq_no, ack }
    }

    /// Restore the saved attributes while keeping the override active
    pub fn restore(&mut self) {
        self.attrs.set(Attr::MacSeqNo, self.seq_no);
        self.attrs.set(Attr::MacAck, self.ack);
    }
}

impl <'a> Deref for AttrOverride<'a> {
    type Target = Attributes;

    fn deref(&self) -> &Self::Target {
        self.attrs
    }
}

impl <'a> DerefMut for AttrOverride<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.attrs
    }
}

impl <'a> Drop for AttrOverride<'a> {
    fn drop(&mut self) {
        self.restore();
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn derive_timing() {
        let mut attrs = Attributes::new(&PhyTiming::default());

        let ack_wait = attrs.derive_mac_timing();

        assert_eq!(attrs.get(Attr::MacUnitBackoffPeriod), 320);
        assert_eq!(ack_wait, 320 + 12 + 10 + 6 * 2 * 16);
        assert_eq!(attrs.get(Attr::MacAckWaitDuration), ack_wait);
    }

    #[test]
    fn receiver_addressing() {
        let mut attrs = Attributes::default();
        assert!(attrs.holds_broadcast());

        attrs.set_receiver(Some(ExtendedAddress(0x0011_2233_4455_cafe)));
        assert!(!attrs.holds_broadcast());
        assert_eq!(attrs.receiver_short(), Some(ShortAddress(0xcafe)));

        attrs.set_receiver(Some(ExtendedAddress::broadcast()));
        assert!(attrs.holds_broadcast());
    }

    #[test]
    fn override_restores_on_drop() {
        let mut attrs = Attributes::default();
        attrs.set(Attr::MacSeqNo, 42);
        attrs.set_bool(Attr::MacAck, true);

        {
            let mut o = AttrOverride::new(&mut attrs);
            o.set(Attr::MacSeqNo, 3);
            o.set_bool(Attr::MacAck, false);
            assert_eq!(o.get(Attr::MacSeqNo), 3);
        }

        assert_eq!(attrs.get(Attr::MacSeqNo), 42);
        assert_eq!(attrs.get_bool(Attr::MacAck), true);
    }

    #[test]
    fn override_restore_keeps_guard() {
        let mut attrs = Attributes::default();
        attrs.set(Attr::MacSeqNo, 9);

        let mut o = AttrOverride::new(&mut attrs);
        o.set(Attr::MacSeqNo, 1);
        o.restore();
        assert_eq!(o.get(Attr::MacSeqNo), 9);

        o.set(Attr::MacSeqNo, 0);
        drop(o);

        assert_eq!(attrs.get(Attr::MacSeqNo), 9);
    }
}
