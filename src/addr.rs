//! # Address Module
//!
//! Provides the [`Addr`] type, an absolute address as reported by the debug info of the
//! explored program.
//!
//! Addresses found in the debug info are usually not the addresses at which the bytes can be
//! found in the backing store of a [`MemoryClient`](crate::memory::MemoryClient). The client
//! applies a signed base offset via [`Addr::translate`] before doing any I/O.

use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::errors::{ExplorerError, Result};

/// An absolute address of the explored program
#[derive(Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Addr(u64);

impl Addr {
    pub const NULL: Addr = Addr(0);

    pub fn u64(&self) -> u64 {
        self.0
    }

    pub fn usize(&self) -> usize {
        self.0 as usize
    }

    /// Applies a base offset: the result is `self - offset`
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::NegativeAddress`] if the translated address would be below
    /// zero or does not fit into 64 bits.
    pub fn translate(&self, offset: i64) -> Result<u64> {
        let translated = self.0 as i128 - offset as i128;
        u64::try_from(translated).map_err(|_| ExplorerError::NegativeAddress(*self, offset))
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::Debug for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Add<u64> for Addr {
    type Output = Self;
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Addr {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs
    }
}

impl Sub for Addr {
    type Output = u64;
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Sub<u64> for Addr {
    type Output = Self;
    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl SubAssign<u64> for Addr {
    fn sub_assign(&mut self, rhs: u64) {
        self.0 -= rhs
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Addr(value)
    }
}

impl From<usize> for Addr {
    fn from(value: usize) -> Self {
        Addr(value as u64)
    }
}

impl From<Addr> for u64 {
    fn from(value: Addr) -> Self {
        value.0
    }
}
