
use ieee802154::mac::{ExtendedAddress, PanId};

use crate::Ts;
use crate::attrs::PhyTiming;

/// Configuration for the smartMAC
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    /// Node link address, the short address is its low 16 bits
    pub address: ExtendedAddress,

    pub pan_id: PanId,

    /// Period of the wake-up (power-up) timer in milliseconds
    pub powerup_timeout_ms: Ts,

    /// Nominal spacing between strobes in milliseconds
    pub strobe_tx_interval_ms: Ts,

    /// Listen window after waking up in milliseconds
    pub scan_timeout_ms: Ts,

    /// Guard subtracted from the computed receive delay in milliseconds
    pub rx_delay_min_ms: Ts,

    /// Window waiting for data after a unicast strobe in milliseconds
    pub rx_timeout_ms: Ts,

    /// Radio timing used to derive the ack wait duration
    pub phy_timing: PhyTiming,
}

impl Default for Config {
    fn default() -> Self {
        let strobe_tx_interval_ms = 6;

        Self {
            address: ExtendedAddress(0x0000_0000_0000_0001),
            pan_id: PanId(0xabcd),

            powerup_timeout_ms: 200,
            strobe_tx_interval_ms,
            scan_timeout_ms: 2 * strobe_tx_interval_ms,
            rx_delay_min_ms: 2 * strobe_tx_interval_ms,
            rx_timeout_ms: 20,

            phy_timing: PhyTiming::default(),
        }
    }
}

impl Config {
    /// Strobes per broadcast burst, enough to span a full wake period
    pub fn max_broadcast_counter(&self) -> u8 {
        let n = self.powerup_timeout_ms.checked_div(self.strobe_tx_interval_ms)
            .unwrap_or(u8::MAX as Ts);

        n.max(1).min(u8::MAX as Ts) as u8
    }

    /// Whether the wake period needs more strobes than a burst can carry,
    /// in which case bursts are cut to 255 strobes and may not span it
    pub fn burst_clamped(&self) -> bool {
        match self.powerup_timeout_ms.checked_div(self.strobe_tx_interval_ms) {
            Some(n) => n > u8::MAX as Ts,
            None => true,
        }
    }

    /// Maximum strobe attempts for a unicast transmission
    pub fn max_unicast_counter(&self) -> u8 {
        self.max_broadcast_counter().saturating_mul(2)
    }

    /// Time the radio may stay off after receiving a broadcast strobe with
    /// the provided counter before the payload is due
    pub fn rx_delay(&self, counter: u8) -> Ts {
        if counter == 0 {
            return 0
        }

        (counter as Ts * self.strobe_tx_interval_ms).saturating_sub(self.rx_delay_min_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strobe_counters() {
        let c = Config::default();
        assert_eq!(c.max_broadcast_counter(), 33);
        assert_eq!(c.max_unicast_counter(), 66);

        let c = Config{ powerup_timeout_ms: 600, ..Default::default() };
        assert_eq!(c.max_broadcast_counter(), 100);
        assert_eq!(c.max_unicast_counter(), 200);

        let c = Config{ powerup_timeout_ms: 6_000, ..Default::default() };
        assert_eq!(c.max_broadcast_counter(), 255);
        assert_eq!(c.max_unicast_counter(), 255);

        let c = Config{ powerup_timeout_ms: 3, ..Default::default() };
        assert_eq!(c.max_broadcast_counter(), 1);
    }

    #[test]
    fn burst_clamping() {
        assert!(!Config::default().burst_clamped());

        // 255 strobes still cover the wake period exactly
        let c = Config{ powerup_timeout_ms: 255 * 6, ..Default::default() };
        assert!(!c.burst_clamped());
        assert_eq!(c.max_broadcast_counter(), 255);

        let c = Config{ powerup_timeout_ms: 256 * 6, ..Default::default() };
        assert!(c.burst_clamped());
        assert_eq!(c.max_broadcast_counter(), 255);

        let c = Config{ strobe_tx_interval_ms: 0, ..Default::default() };
        assert!(c.burst_clamped());
        assert_eq!(c.max_broadcast_counter(), 255);
    }

    #[test]
    fn rx_delay() {
        let c = Config::default();

        assert_eq!(c.rx_delay(0), 0);
        assert_eq!(c.rx_delay(1), 0);
        assert_eq!(c.rx_delay(2), 0);
        assert_eq!(c.rx_delay(3), 6);
        assert_eq!(c.rx_delay(20), 108);

        // Non-decreasing in the counter
        let mut last = 0;
        for counter in 0..=u8::MAX {
            let d = c.rx_delay(counter);
            assert!(d >= last);
            last = d;
        }
    }
}
