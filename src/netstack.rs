//! Network stack wiring between the MAC and its neighbouring layers
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::error::CoreError;
use crate::phy::Phy;

/// Data-link upper layer, receives frames accepted by the MAC
pub trait Dllc<E> {
    /// Deliver a received frame
    fn recv(&mut self, data: &[u8]) -> Result<(), CoreError<E>>;
}

/// Layers surrounding the MAC, the PHY below and the DLLC above
#[derive(Debug, Clone)]
pub struct Netstack<P, U> {
    pub phy: P,
    pub dllc: U,
}

impl <P, U> Netstack<P, U>
where
    P: Phy,
    U: Dllc<P::Error>,
{
    pub fn new(phy: P, dllc: U) -> Self {
        Self { phy, dllc }
    }
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use crate::error::CoreError;
    use super::Dllc;

    #[derive(Debug, Default)]
    struct Inner {
        received: Vec<Vec<u8>>,
        reject: bool,
    }

    /// Mock DLLC, records delivered frames
    #[derive(Clone, Debug, Default)]
    pub struct MockDllc(Arc<Mutex<Inner>>);

    impl MockDllc {
        pub fn new() -> Self {
            Self::default()
        }

        /// Frames delivered so far
        pub fn received(&self) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().received.clone()
        }

        /// Reject subsequent frames with `CoreError::Fatal`
        pub fn set_reject(&mut self, reject: bool) {
            self.0.lock().unwrap().reject = reject;
        }
    }

    impl <E> Dllc<E> for MockDllc {
        fn recv(&mut self, data: &[u8]) -> Result<(), CoreError<E>> {
            let mut i = self.0.lock().unwrap();
            i.received.push(data.to_vec());

            match i.reject {
                true => Err(CoreError::Fatal),
                false => Ok(()),
            }
        }
    }
}
