//! smartMAC state machine
//!
//! Nodes sleep with the radio off and wake every power-up period to scan
//! briefly for strobes. Senders precede each payload with a burst of
//! strobes long enough to cover a full wake period, receivers use the
//! counter carried in broadcast strobes to sleep until the payload is due
//! and acknowledge unicast strobes to cut the burst short.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use embedded_hal::delay::DelayNs;
use ieee802154::mac::ShortAddress;

use crate::Ts;
use crate::log::{trace, debug, warn, error};
use crate::attrs::{self, Attr, AttrValue, Attributes};
use crate::error::CoreError;
use crate::frame::{Frame, BROADCAST_ADDR};
use crate::netstack::{Dllc, Netstack};
use crate::phy::Phy;
use crate::timer::{Timer, TimerKind, TimerService, TimerState};

use super::{Config, Mac, MacState, TimerId};

/// Number of timers owned by the MAC
const NUM_TIMERS: usize = 4;

/// smartMAC instance, generic over the PHY adapter `P`, upper layer `U`,
/// monotonic clock `T` and strobe delay provider `D`.
///
/// All entry points (`send`, `recv`, `tick`) take `&mut self` so the
/// runtime serialises them, a transmission always completes before any
/// frame or timer event is processed.
#[derive(Debug)]
pub struct SmartMac<P, U, T, D> {
    pub(super) config: Config,
    pub(super) netstack: Netstack<P, U>,
    pub(super) attrs: Attributes,
    pub(super) delay: D,

    timer: T,
    timers: TimerService<TimerId, NUM_TIMERS>,

    pub(super) state: MacState,
    rx_delay: Ts,
}

impl <P, U, T, D> SmartMac<P, U, T, D>
where
    P: Phy,
    U: Dllc<P::Error>,
    T: Timer,
    D: DelayNs,
{
    /// Initialise the MAC, configuring addressing attributes and timers and
    /// powering the radio down
    pub fn new(config: Config, netstack: Netstack<P, U>, timer: T, delay: D) -> Result<Self, CoreError<P::Error>> {
        let mut attrs = Attributes::new(&config.phy_timing);
        attrs.set(Attr::MacShortAddr, attrs::short_address(config.address).0 as AttrValue);
        attrs.set(Attr::MacPanId, config.pan_id.0 as AttrValue);
        let ack_wait = attrs.derive_mac_timing();

        let mut timers = TimerService::new();
        let timer_cfg = [
            (TimerId::PowerUp, TimerKind::Periodic, config.powerup_timeout_ms),
            (TimerId::Scan, TimerKind::OneShot, config.scan_timeout_ms),
            (TimerId::RxPending, TimerKind::OneShot, config.rx_timeout_ms),
            // Duration set per broadcast strobe
            (TimerId::RxDelay, TimerKind::OneShot, 0),
        ];
        for &(id, kind, duration) in timer_cfg.iter() {
            timers.create(id, kind, duration).map_err(|e| {
                error!("Failed to create timer {:?}: {:?}", id, e);
                CoreError::Fatal
            })?;
        }

        let mut s = Self {
            config,
            netstack,
            attrs,
            delay,
            timer,
            timers,
            state: MacState::Off,
            rx_delay: 0,
        };

        debug!("Setup smartMAC with address {:?} (ack wait: {} us)", s.config.address, ack_wait);

        if s.config.burst_clamped() {
            warn!("Power-up period {} ms needs more than {} strobes at {} ms, bursts will not span a full wake period",
                s.config.powerup_timeout_ms, s.config.max_broadcast_counter(), s.config.strobe_tx_interval_ms);
        }

        s.off_entry();

        Ok(s)
    }

    /// Fetch the current MAC state
    pub fn state(&self) -> MacState {
        self.state
    }

    /// Fetch the state of one of the MAC timers
    pub fn timer_state(&self, id: TimerId) -> Option<TimerState> {
        self.timers.state(id)
    }

    /// Delay computed from the last broadcast strobe in milliseconds
    pub fn rx_delay(&self) -> Ts {
        self.rx_delay
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Mutable attribute access, used by upper layers to set the receiver,
    /// sequence number and acknowledgement flag before `send`
    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn netstack(&self) -> &Netstack<P, U> {
        &self.netstack
    }

    pub fn netstack_mut(&mut self) -> &mut Netstack<P, U> {
        &mut self.netstack
    }

    /// Short address of this node
    pub fn short_address(&self) -> ShortAddress {
        ShortAddress(self.attrs.get(Attr::MacShortAddr) as u16)
    }

    pub(super) fn set_state(&mut self, state: MacState) {
        debug!("State {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn start_timer(&mut self, id: TimerId) {
        let now = self.timer.ticks_ms();
        if let Err(e) = self.timers.start(id, now) {
            error!("Failed to start timer {:?}: {:?}", id, e);
        }
    }

    fn stop_timer(&mut self, id: TimerId) {
        if let Err(e) = self.timers.stop(id) {
            error!("Failed to stop timer {:?}: {:?}", id, e);
        }
    }

    pub(super) fn off_entry(&mut self) {
        self.set_state(MacState::Off);

        if let Err(e) = self.netstack.phy.off() {
            warn!("PHY off failed: {:?}", e);
        }
    }

    pub(super) fn on_entry(&mut self) {
        self.set_state(MacState::On);

        if let Err(e) = self.netstack.phy.on() {
            warn!("PHY on failed: {:?}", e);
        }
    }

    fn scan_entry(&mut self) {
        self.set_state(MacState::Scan);
        self.start_timer(TimerId::Scan);
    }

    fn scan_exit(&mut self) {
        self.stop_timer(TimerId::Scan);
    }

    fn rx_pending_entry(&mut self) {
        self.set_state(MacState::RxPending);
        self.start_timer(TimerId::RxPending);
    }

    fn rx_pending_exit(&mut self) {
        self.stop_timer(TimerId::RxPending);
    }

    fn rx_delay_entry(&mut self) {
        self.set_state(MacState::RxDelay);

        if let Err(e) = self.timers.set_duration(TimerId::RxDelay, self.rx_delay) {
            error!("Failed to set rx delay: {:?}", e);
        }
        self.start_timer(TimerId::RxDelay);
    }

    fn rx_delay_exit(&mut self) {
        self.stop_timer(TimerId::RxDelay);
    }

    /// Handle a strobe received while scanning
    fn handle_strobe(&mut self, frame: &Frame) {
        if frame.is_broadcast() {
            self.rx_delay = self.config.rx_delay(frame.counter);

            debug!("Broadcast strobe {} from {:?} (rx delay: {} ms)",
                frame.counter, frame.src_addr, self.rx_delay);

            self.scan_exit();

            if self.rx_delay > 0 {
                // Sleep until the payload is due
                self.off_entry();
                self.rx_delay_entry();

            } else if frame.counter > 0 {
                // Keep listening for the rest of the burst
                self.scan_entry();
            }

            // Counter 0 leaves the scan timer stopped until the payload arrives
            return;
        }

        if frame.dest_addr != self.short_address() {
            trace!("Ignoring strobe for {:?}", frame.dest_addr);
            return;
        }

        debug!("Unicast strobe {} from {:?}", frame.counter, frame.src_addr);

        self.scan_exit();
        self.rx_pending_entry();
    }

    /// Forward a data frame to the upper layer, returning the upper layer's result
    fn forward(&mut self, data: &[u8]) -> Result<(), CoreError<P::Error>> {
        let res = self.netstack.dllc.recv(data);

        if let Err(e) = &res {
            error!("Upper layer rejected frame: {:?}", e);
        }

        res
    }

    /// Dispatch a timer expiry, ignoring expiries not matching the current state
    fn timer_expired(&mut self, id: TimerId) {
        trace!("Timer {:?} expired in state {:?}", id, self.state);

        match (id, self.state) {
            (TimerId::PowerUp, MacState::Off) => {
                self.on_entry();
                self.scan_entry();
            },
            (TimerId::Scan, MacState::Scan) => {
                self.scan_exit();
                self.off_entry();
            },
            (TimerId::RxPending, MacState::RxPending) => {
                self.rx_pending_exit();
                self.off_entry();
            },
            (TimerId::RxDelay, MacState::RxDelay) => {
                self.rx_delay_exit();
                self.on_entry();
                self.scan_entry();
            },
            (id, state) => {
                trace!("Ignoring timer {:?} in state {:?}", id, state);
            },
        }
    }
}

impl <P, U, T, D> Mac for SmartMac<P, U, T, D>
where
    P: Phy,
    U: Dllc<P::Error>,
    T: Timer,
    D: DelayNs,
{
    type Error = CoreError<P::Error>;

    fn start(&mut self) -> Result<(), Self::Error> {
        debug!("Starting duty cycle ({} ms period)", self.config.powerup_timeout_ms);

        self.start_timer(TimerId::PowerUp);

        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        debug!("Stopping duty cycle in state {:?}", self.state);

        for &id in [TimerId::PowerUp, TimerId::Scan, TimerId::RxPending, TimerId::RxDelay].iter() {
            self.stop_timer(id);
        }

        self.off_entry();

        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.state != MacState::Off {
            error!("MAC busy in state {:?}", self.state);
            return Err(CoreError::Busy);
        }

        let res = match (self.attrs.holds_broadcast(), self.attrs.receiver_short()) {
            (true, _) => self.tx_broadcast(data),
            (false, Some(dest)) if dest != BROADCAST_ADDR => self.tx_unicast(dest, data),
            (false, dest) => {
                error!("Receiver {:?} has no unicast short address ({:?})", self.attrs.receiver(), dest);
                return Err(CoreError::Fatal);
            },
        };

        debug!("Send complete: {:?}", res);

        res
    }

    fn recv(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let frame = Frame::decode(data);

        trace!("Received {:?} frame ({} bytes) in state {:?}", frame.frame_type, data.len(), self.state);

        match self.state {
            MacState::Scan if frame.is_strobe() => {
                self.handle_strobe(&frame);
                Ok(())
            },
            MacState::Scan => {
                let res = self.forward(data);
                self.scan_exit();
                self.off_entry();
                res
            },
            MacState::RxPending if frame.is_strobe() => {
                trace!("Ignoring strobe while waiting for data");
                Ok(())
            },
            MacState::RxPending => {
                let res = self.forward(data);
                self.rx_pending_exit();
                self.off_entry();
                res
            },
            state => {
                error!("Unexpected frame in state {:?}", state);
                Ok(())
            },
        }
    }

    fn ioctl(&mut self, cmd: u16, value: u32) -> Result<(), Self::Error> {
        trace!("ioctl {} ({}) ignored", cmd, value);
        Ok(())
    }

    fn tick(&mut self) -> Result<(), Self::Error> {
        let now = self.timer.ticks_ms();

        for e in self.timers.poll(now) {
            if !self.timers.is_current(&e) {
                trace!("Dropping stale expiry for {:?}", e.key);
                continue;
            }

            self.timer_expired(e.key);
        }

        Ok(())
    }
}
