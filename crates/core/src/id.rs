//! External transaction identifiers
//!
//! A transaction is addressed from outside by a fixed-width 16-character
//! hexadecimal string: the high and low 32-bit halves of the internal 64-bit
//! index, each as 8 lowercase hex digits. The fixed width lets malformed ids
//! be rejected before any pool lookup.

use crate::error::{CoreError, Result};
use std::fmt;
use std::str::FromStr;

/// Identifier of a pooled transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Length of the encoded form
    pub const ENCODED_LEN: usize = 16;

    /// Wrap an internal index
    pub const fn from_index(tidx: u64) -> Self {
        TransactionId(tidx)
    }

    /// Internal 64-bit index
    pub const fn index(&self) -> u64 {
        self.0
    }

    /// Encode as 16 lowercase hex characters
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode the 16-character form
    ///
    /// Accepts upper and lower case digits. Any other length or character is
    /// rejected with [`CoreError::MalformedTransactionId`].
    pub fn parse(id: &str) -> Result<Self> {
        if id.len() != Self::ENCODED_LEN {
            return Err(malformed(id, "expected 16 characters"));
        }
        if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed(id, "expected hexadecimal digits"));
        }
        let (hi, lo) = id.split_at(8);
        let hi = u32::from_str_radix(hi, 16).map_err(|_| malformed(id, "bad high half"))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| malformed(id, "bad low half"))?;
        Ok(TransactionId(((hi as u64) << 32) | lo as u64))
    }
}

fn malformed(id: &str, reason: &'static str) -> CoreError {
    CoreError::MalformedTransactionId {
        id: id.to_string(),
        reason,
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:08x}", (self.0 >> 32) as u32, self.0 as u32)
    }
}

impl FromStr for TransactionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        TransactionId::parse(s)
    }
}
