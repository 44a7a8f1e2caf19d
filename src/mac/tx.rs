//! smartMAC transmit paths
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use embedded_hal::delay::DelayNs;
use ieee802154::mac::{PanId, ShortAddress};

use crate::log::{trace, debug, error};
use crate::attrs::{Attr, AttrOverride, AttrValue, Attributes};
use crate::error::CoreError;
use crate::frame::{Frame, BROADCAST_ADDR, PHY_HEADER_LEN, STROBE_BUF_LEN};
use crate::netstack::{Dllc, Netstack};
use crate::phy::Phy;
use crate::timer::Timer;

use super::{MacState, SmartMac};

/// Build a strobe from the attribute store and hand it to the PHY
fn tx_strobe<P: Phy>(phy: &mut P, attrs: &Attributes, dest: ShortAddress) -> Result<(), CoreError<P::Error>> {
    let frame = Frame::strobe(
        attrs.get(Attr::MacSeqNo) as u8,
        attrs.get_bool(Attr::MacAck),
        PanId(attrs.get(Attr::MacPanId) as u16),
        ShortAddress(attrs.get(Attr::MacShortAddr) as u16),
        dest,
    );

    let mut buff = [0u8; STROBE_BUF_LEN];
    let n = frame.encode(&mut buff[PHY_HEADER_LEN..]);

    trace!("TX strobe {} to {:?}", frame.counter, dest);

    phy.send(&buff[PHY_HEADER_LEN..][..n])
}

impl <P, U, T, D> SmartMac<P, U, T, D>
where
    P: Phy,
    U: Dllc<P::Error>,
    T: Timer,
    D: DelayNs,
{
    /// Send a burst of `max` strobes counting down to zero followed by the payload.
    ///
    /// Broadcast strobes are never acknowledged, any strobe failure aborts
    /// the burst without sending the payload.
    pub(super) fn tx_broadcast(&mut self, data: &[u8]) -> Result<(), CoreError<P::Error>> {
        self.on_entry();
        self.set_state(MacState::TxBroadcast);

        let max = self.config.max_broadcast_counter();
        let gap_us = self.attrs.get(Attr::MacAckWaitDuration);

        debug!("Broadcast TX, {} strobes spaced {} us", max, gap_us);

        let res = {
            let Self { netstack, attrs, delay, .. } = self;
            let Netstack { phy, .. } = netstack;

            let mut attrs = AttrOverride::new(attrs);
            attrs.set_bool(Attr::MacAck, false);

            let mut res = Ok(());

            for counter in (0..max).rev() {
                attrs.set(Attr::MacSeqNo, counter as AttrValue);

                if let Err(e) = tx_strobe(phy, &attrs, BROADCAST_ADDR) {
                    error!("Broadcast strobe {} failed: {:?}", counter, e);
                    res = Err(e);
                    break;
                }

                delay.delay_us(gap_us);
            }

            if res.is_ok() {
                attrs.restore();
                res = phy.send(data);
            }

            res
        };

        self.off_entry();

        res
    }

    /// Send unicast strobes until one is acknowledged, then the payload.
    ///
    /// A missing acknowledgement moves on to the next strobe, any other
    /// failure ends the transmission. Exhausting the attempts returns
    /// `CoreError::NoAck`.
    pub(super) fn tx_unicast(&mut self, dest: ShortAddress, data: &[u8]) -> Result<(), CoreError<P::Error>> {
        self.on_entry();
        self.set_state(MacState::TxUnicast);

        let max = self.config.max_unicast_counter();

        debug!("Unicast TX to {:?}, up to {} strobes", dest, max);

        let res = {
            let Self { netstack, attrs, .. } = self;
            let Netstack { phy, .. } = netstack;

            let mut attrs = AttrOverride::new(attrs);
            attrs.set_bool(Attr::MacAck, true);

            let mut res = Err(CoreError::NoAck);

            for counter in (0..max).rev() {
                attrs.set(Attr::MacSeqNo, counter as AttrValue);

                match tx_strobe(phy, &attrs, dest) {
                    Ok(()) => {
                        debug!("Strobe {} acknowledged", counter);

                        attrs.restore();
                        res = phy.send(data);

                        if let Err(e) = &res {
                            error!("Unicast TX failed: {:?}", e);
                        }
                        break;
                    },
                    Err(e) if !e.is_terminal() => {
                        trace!("Strobe {} not acknowledged", counter);
                        res = Err(e);
                    },
                    Err(e @ CoreError::Timeout) | Err(e @ CoreError::Collision) | Err(e @ CoreError::Busy) => {
                        debug!("Unicast strobe {} aborted: {:?}", counter, e);
                        res = Err(e);
                        break;
                    },
                    Err(e) => {
                        error!("Unicast strobe {} failed unexpectedly: {:?}", counter, e);
                        res = Err(e);
                        break;
                    },
                }
            }

            res
        };

        self.off_entry();

        res
    }
}

#[cfg(test)]
mod test {
    use ieee802154::mac::ExtendedAddress;

    use crate::frame::{Frame, FrameType};
    use crate::mac::{Config, Mac, MacState, TimerId};
    use crate::mac::smart::test::{setup, strobe, test_config, wake, Harness};
    use crate::phy::mock::MockResult;

    use super::*;

    const PAYLOAD: [u8; 11] = [0x41, 0xd8, 0x07, 0xcd, 0xab, 0xff, 0xff, 0xfe, 0xca, 0xaa, 0xbb];

    fn preset_attrs(h: &mut Harness, receiver: Option<ExtendedAddress>) {
        let a = h.mac.attrs_mut();
        a.set(Attr::MacSeqNo, 77);
        a.set_bool(Attr::MacAck, true);
        a.set_receiver(receiver);
    }

    fn assert_restored(h: &Harness) {
        assert_eq!(h.mac.attrs().get(Attr::MacSeqNo), 77);
        assert_eq!(h.mac.attrs().get_bool(Attr::MacAck), true);
        assert_eq!(h.mac.state(), MacState::Off);
        assert!(!h.phy.powered());
    }

    #[test]
    fn send_busy_leaves_state_and_timers() {
        const TIMERS: [TimerId; 4] = [TimerId::PowerUp, TimerId::Scan, TimerId::RxPending, TimerId::RxDelay];

        let cases: [(Option<std::vec::Vec<u8>>, MacState); 4] = [
            (None, MacState::Scan),
            // Last broadcast strobe leaves the scan timer stopped
            (Some(strobe(0, BROADCAST_ADDR)), MacState::Scan),
            (Some(strobe(20, BROADCAST_ADDR)), MacState::RxDelay),
            (Some(strobe(5, ShortAddress(0xcafe))), MacState::RxPending),
        ];

        for (rx, expected) in cases.iter() {
            let mut h = setup(test_config());
            wake(&mut h);

            if let Some(f) = rx {
                h.mac.recv(f).unwrap();
            }
            assert_eq!(h.mac.state(), *expected);

            let timers: std::vec::Vec<_> = TIMERS.iter().map(|id| h.mac.timer_state(*id)).collect();
            let powered = h.phy.powered();
            let cycles = h.phy.power_cycles();

            for receiver in [Some(ExtendedAddress(0x1121)), None].iter() {
                preset_attrs(&mut h, *receiver);

                assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Busy));

                assert_eq!(h.mac.state(), *expected);
                let after: std::vec::Vec<_> = TIMERS.iter().map(|id| h.mac.timer_state(*id)).collect();
                assert_eq!(after, timers);
                assert_eq!(h.phy.powered(), powered);
                assert_eq!(h.phy.power_cycles(), cycles);
                assert!(h.phy.sent().is_empty());
                assert!(h.delay.delays_us().is_empty());
            }
        }
    }

    #[test]
    fn unicast_receiver_on_broadcast_short_address() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1234_ffff)));
        assert!(!h.mac.attrs().holds_broadcast());

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Fatal));

        assert!(h.phy.sent().is_empty());
        assert_eq!(h.phy.power_cycles(), (0, 1));
        assert_restored(&h);
    }

    #[test]
    fn broadcast_burst() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, None);

        assert_eq!(h.mac.send(&PAYLOAD), Ok(()));

        let sent = h.phy.sent();
        assert_eq!(sent.len(), 33 + 1);

        for (i, s) in sent[..33].iter().enumerate() {
            let f = Frame::decode(s);
            assert_eq!(f.frame_type, FrameType::Strobe);
            assert_eq!(f.counter, 32 - i as u8);
            assert_eq!(f.ack_required, false);
            assert_eq!(f.dest_addr, BROADCAST_ADDR);
            assert_eq!(f.src_addr, ShortAddress(0xcafe));
            assert_eq!(f.pan_id, PanId(0xabcd));
        }
        assert_eq!(sent[33], PAYLOAD.to_vec());

        // Each strobe is followed by the ack wait gap
        let ack_wait = h.mac.attrs().get(Attr::MacAckWaitDuration);
        assert_eq!(h.delay.delays_us(), vec![ack_wait; 33]);

        assert_restored(&h);
    }

    #[test]
    fn broadcast_strobe_failure_aborts() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress::broadcast()));

        h.phy.script(&[Ok(()), Ok(()), Err(CoreError::Collision)]);

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Collision));

        // No payload after the failed strobe
        let sent = h.phy.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|s| Frame::decode(s).is_strobe()));
        assert_eq!(h.delay.delays_us().len(), 2);

        assert_restored(&h);
    }

    #[test]
    fn broadcast_payload_failure() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, None);

        let mut script: std::vec::Vec<MockResult> = vec![Ok(()); 33];
        script.push(Err(CoreError::Timeout));
        h.phy.script(&script);

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Timeout));
        assert_eq!(h.phy.sent().len(), 34);

        assert_restored(&h);
    }

    #[test]
    fn broadcast_short_burst() {
        let mut h = setup(Config{ powerup_timeout_ms: 12, ..test_config() });
        preset_attrs(&mut h, None);

        assert_eq!(h.mac.send(&PAYLOAD), Ok(()));

        let counters: std::vec::Vec<_> = h.phy.sent()[..2].iter()
            .map(|s| Frame::decode(s).counter)
            .collect();
        assert_eq!(counters, vec![1, 0]);
        assert_eq!(h.phy.sent().len(), 3);
    }

    #[test]
    fn unicast_immediate_ack() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x0000_0000_0000_1121)));

        assert_eq!(h.mac.send(&PAYLOAD), Ok(()));

        let sent = h.phy.sent();
        assert_eq!(sent.len(), 2);

        let f = Frame::decode(&sent[0]);
        assert!(f.is_strobe());
        assert_eq!(f.counter, 65);
        assert_eq!(f.ack_required, true);
        assert_eq!(f.dest_addr, ShortAddress(0x1121));
        assert_eq!(sent[1], PAYLOAD.to_vec());

        // Unicast strobes are not spaced
        assert!(h.delay.delays_us().is_empty());

        assert_restored(&h);
    }

    #[test]
    fn unicast_ack_after_retries() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1121)));

        h.phy.script(&[Err(CoreError::NoAck), Err(CoreError::NoAck), Ok(())]);

        assert_eq!(h.mac.send(&PAYLOAD), Ok(()));

        let sent = h.phy.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(Frame::decode(&sent[2]).counter, 63);
        assert_eq!(sent[3], PAYLOAD.to_vec());

        assert_restored(&h);
    }

    #[test]
    fn unicast_no_ack_exhausts_attempts() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1121)));

        // More failures scripted than attempts allowed
        let script: std::vec::Vec<MockResult> = vec![Err(CoreError::NoAck); 500];
        h.phy.script(&script);

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::NoAck));

        let max = h.mac.config().max_broadcast_counter() as usize;
        let sent = h.phy.sent();
        assert_eq!(sent.len(), 2 * max);
        assert_eq!(sent.len(), 66);
        assert!(sent.iter().all(|s| Frame::decode(s).is_strobe()));
        assert_eq!(Frame::decode(&sent[0]).counter, 65);
        assert_eq!(Frame::decode(&sent[65]).counter, 0);

        assert_restored(&h);
    }

    #[test]
    fn unicast_collision_aborts() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1121)));

        h.phy.script(&[Err(CoreError::NoAck), Err(CoreError::Collision)]);

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Collision));
        assert_eq!(h.phy.sent().len(), 2);

        assert_restored(&h);
    }

    #[test]
    fn unicast_timeout_and_fatal_abort() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1121)));

        h.phy.script(&[Err(CoreError::Timeout)]);
        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Timeout));
        assert_eq!(h.phy.sent().len(), 1);
        assert_restored(&h);

        h.phy.clear();
        h.phy.script(&[Err(CoreError::Fatal)]);
        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Fatal));
        assert_eq!(h.phy.sent().len(), 1);
        assert_restored(&h);
    }

    #[test]
    fn unicast_payload_failure_ends_transmission() {
        let mut h = setup(test_config());
        preset_attrs(&mut h, Some(ExtendedAddress(0x1121)));

        h.phy.script(&[Ok(()), Err(CoreError::Timeout)]);

        assert_eq!(h.mac.send(&PAYLOAD), Err(CoreError::Timeout));
        assert_eq!(h.phy.sent().len(), 2);

        assert_restored(&h);
    }
}
