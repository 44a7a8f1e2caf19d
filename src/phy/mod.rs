//! Physical layer (PHY) adapter interface
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::error::CoreError;
use crate::log::FmtError;

#[cfg(any(test, feature="mocks"))]
pub mod mock;

/// PHY adapter consumed by the MAC.
///
/// Received frames travel the other way, the runtime hands them to the
/// MAC's `recv` on the same thread that calls `send` and `tick`.
pub trait Phy {
    /// Underlying driver error
    type Error: FmtError;

    /// Power up the radio and start receiving
    fn on(&mut self) -> Result<(), CoreError<Self::Error>>;

    /// Power down the radio
    fn off(&mut self) -> Result<(), CoreError<Self::Error>>;

    /// Transmit a frame, blocking until complete.
    ///
    /// Frames requesting an acknowledgement return `CoreError::NoAck` when
    /// none is received, a busy channel is reported as `CoreError::Collision`
    /// (or `CoreError::Busy`) and a transmission that does not complete in
    /// time as `CoreError::Timeout`.
    fn send(&mut self, data: &[u8]) -> Result<(), CoreError<Self::Error>>;
}
