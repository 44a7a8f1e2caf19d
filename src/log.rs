//! Logging facade, selects between `log` and `defmt` backends
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

#[cfg(not(feature = "defmt"))]
pub use ::log::{trace, debug, info, warn, error};

#[cfg(feature = "defmt")]
pub use defmt::{trace, debug, info, warn, error};

/// Bound for error types that can be emitted by the active log backend
#[cfg(not(feature = "defmt"))]
pub trait FmtError: core::fmt::Debug {}

#[cfg(not(feature = "defmt"))]
impl <T: core::fmt::Debug> FmtError for T {}

/// Bound for error types that can be emitted by the active log backend
#[cfg(feature = "defmt")]
pub trait FmtError: core::fmt::Debug + defmt::Format {}

#[cfg(feature = "defmt")]
impl <T: core::fmt::Debug + defmt::Format> FmtError for T {}
