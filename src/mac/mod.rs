//! Medium Access Control (MAC) layer module.
//! Contains the MAC driver trait and the smartMAC implementation.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub mod config;
pub use config::Config;

pub mod state;
pub use state::{MacState, TimerId};

pub mod smart;
pub use smart::SmartMac;

mod tx;

/// Generic MAC driver trait, the contract between a MAC and the netstack
pub trait Mac {
    type Error;

    /// Start duty cycling
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Stop duty cycling and power down the radio
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Send a frame to the receiver held in the attribute store
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Handle a frame received by the PHY
    fn recv(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Driver specific control hook
    fn ioctl(&mut self, cmd: u16, value: u32) -> Result<(), Self::Error>;

    /// Update the MAC state, dispatching any expired timers
    fn tick(&mut self) -> Result<(), Self::Error>;
}
