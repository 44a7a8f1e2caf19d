
/// smartMAC states
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacState {
    /// Radio powered down, resting state between wake-ups
    Off,
    /// Radio powered up without a specific duty-cycle activity
    On,
    /// Listening for strobes after a wake-up
    Scan,
    RxStrobe,
    /// Radio off until a broadcast payload is due
    RxDelay,
    /// Unicast strobe matched, waiting for the data frame
    RxPending,
    TxDelay,
    /// Sending a broadcast strobe burst and payload
    TxBroadcast,
    /// Sending unicast strobes until acknowledged, then the payload
    TxUnicast,
    Err,
}

impl MacState {
    /// Whether the radio is powered in this state
    pub fn is_powered(&self) -> bool {
        use MacState::*;

        match self {
            On | Scan | RxStrobe | RxPending | TxDelay | TxBroadcast | TxUnicast => true,
            Off | RxDelay | Err => false,
        }
    }
}

/// Timers driving the smartMAC
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Periodic wake-up
    PowerUp,
    /// Listen window after wake-up
    Scan,
    /// Wait for data after a unicast strobe
    RxPending,
    /// Radio-off period before a broadcast payload
    RxDelay,
}
