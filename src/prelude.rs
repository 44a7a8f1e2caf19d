//! smartMAC crate prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::Ts;

pub use crate::error::CoreError;
pub use crate::timer::{Timer as MacTimer};
pub use crate::attrs::{Attr, Attributes, PhyTiming};
pub use crate::phy::Phy;
pub use crate::netstack::{Dllc, Netstack};

pub use crate::mac::{Mac, MacState, SmartMac, Config as SmartMacConfig};

pub use ieee802154::mac::{PanId, ShortAddress, ExtendedAddress};
