
/// Netstack errors, shared by the PHY adapters, the MAC and the upper layer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreError<E> {
    /// MAC is busy with another transaction
    Busy,

    /// Transmission was not acknowledged
    NoAck,

    /// PHY could not complete the operation in time
    Timeout,

    /// Channel busy / collision detected
    Collision,

    /// Unexpected or unclassified failure
    Fatal,

    /// Frame does not fit the available buffer
    BufferFull,

    /// Wrapper for unhandled / underlying radio errors
    Radio(E),
}

impl <E> CoreError<E> {
    /// Whether this outcome ends a strobe burst (everything except `NoAck`)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CoreError::NoAck)
    }
}
