// src/core/addr.rs

//! Link-layer address parsing and formatting.
//!
//! Addresses are the lower 64 bits of an EUI-64, rendered on the wire in
//! shortened hex form `x:xxxx:xx:xxxx`, with the U/L bit of the first byte
//! flipped relative to the in-memory representation (IPv6 interface-
//! identifier convention). Grounded on `na_to_linkaddr`/`linkaddr_to_na`
//! in the original scheduler-interface source: groups 1 and 2 cover bytes
//! 0-1 and 2-3 in full, but group 3 renders only byte 5 (`%02x`) — byte 4
//! is never written to the wire — and group 4 covers bytes 6-7. Byte 4 is
//! therefore not addressable through this format and is always zero.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The U/L (universal/local) bit toggled between wire and in-memory form.
const UL_BIT: u8 = 0x02;

/// A link-layer address. 8 bytes covers both 48-bit (zero-padded) and
/// 64-bit EUI-64 addresses; the broadcast address is all-ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub [u8; 8]);

impl Addr {
    /// Byte 4 is forced to zero: the wire codec never transmits it (see
    /// module docs), so this is the only all-ones address the format can
    /// round-trip.
    pub const BROADCAST: Addr = Addr([0xff, 0xff, 0xff, 0xff, 0x00, 0xff, 0xff, 0xff]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddrError {
    #[error("address must have exactly 4 colon-separated hex groups")]
    WrongGroupCount,
    #[error("hex group out of range: {0}")]
    BadGroup(String),
}

impl FromStr for Addr {
    type Err = AddrError;

    /// Parses the wire form `x:xxxx:xx:xxxx` (4 groups of 16 bits each,
    /// big-endian within a group) and flips the U/L bit of the first byte
    /// to recover the in-memory address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 4 {
            return Err(AddrError::WrongGroupCount);
        }
        let mut bytes = [0u8; 8];
        for (i, group) in groups.iter().enumerate() {
            let val = u16::from_str_radix(group, 16)
                .map_err(|_| AddrError::BadGroup((*group).to_string()))?;
            bytes[2 * i] = (val >> 8) as u8;
            bytes[2 * i + 1] = val as u8;
        }
        bytes[0] ^= UL_BIT;
        Ok(Addr(bytes))
    }
}

impl fmt::Display for Addr {
    /// Formats the in-memory address as the wire form `x:xxxx:xx:xxxx`,
    /// flipping the U/L bit of the first byte on the way out. Group 1 is
    /// byte 0 unpadded immediately followed by byte 1 zero-padded to 2
    /// digits; group 2 and group 4 are the 2-byte groups bytes 2-3 and
    /// 6-7, padded to 4 digits; group 3 is byte 5 alone, padded to 2
    /// digits — byte 4 is dropped, never rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:x}{:02x}:{:04x}:{:02x}:{:04x}",
            b[0] ^ UL_BIT,
            b[1],
            u16::from_be_bytes([b[2], b[3]]),
            b[5],
            u16::from_be_bytes([b[6], b[7]]),
        )
    }
}

impl serde::Serialize for Addr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Addr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Addr::from_str(&s).map_err(serde::de::Error::custom)
    }
}
