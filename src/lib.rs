//! smartMAC, a duty-cycled strobe MAC for LPWAN radio nodes
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

#![no_std]

#[cfg(any(test, feature="std"))]
#[macro_use]
extern crate std;

pub mod log;

pub mod error;

pub mod timer;

pub mod frame;

pub mod attrs;

pub mod phy;

pub mod netstack;

pub mod mac;

pub mod prelude;


/// Timestamps are 64-bit in milliseconds
pub type Ts = u64;
