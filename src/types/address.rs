//! 20-byte account address derived from a secp256k1 public key.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_LEN: usize = 20;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn zero() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Error returned when parsing a hex address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address '{0}'")]
pub struct ParseAddressError(pub String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| ParseAddressError(s.to_string()))?;
        let arr: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Address(arr))
    }
}
