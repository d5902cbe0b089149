//! Byte mask parsing.
//!
//! A mask is written as eight whitespace-separated hex bytes, e.g.
//! `"AF BF FF AF F1 F2 1F FF"`. The first token becomes the most
//! significant byte of the 64-bit value.

use std::fmt;
use std::str::FromStr;
use crate::error::EngineError;

/// Number of bytes in a mask (and in a transform word).
pub const MASK_LEN: usize = 8;

/// A parsed 64-bit XOR mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mask(u64);

impl Mask {
    /// Parse the textual byte mask.
    ///
    /// # Errors
    /// `InvalidMaskFormat` unless there are exactly 8 tokens,
    /// `InvalidMaskByte` if a token is not a base-16 byte.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() != MASK_LEN {
            return Err(EngineError::InvalidMaskFormat {
                count: tokens.len(),
            });
        }

        let mut value: u64 = 0;
        for token in tokens {
            let byte = parse_hex_byte(token).ok_or_else(|| EngineError::InvalidMaskByte {
                token: token.to_string(),
            })?;
            value = (value << 8) | u64::from(byte);
        }

        Ok(Mask(value))
    }

    /// The raw 64-bit value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Mask bytes as they are applied to a little-endian word.
    pub fn word_bytes(self) -> [u8; MASK_LEN] {
        self.0.to_le_bytes()
    }

    /// Mask byte applied to byte `index` of a trailing partial word.
    ///
    /// Tail byte 0 pairs with the most significant mask byte.
    pub fn tail_byte(self, index: usize) -> u8 {
        debug_assert!(index < MASK_LEN);
        self.0.to_be_bytes()[index]
    }
}

impl From<u64> for Mask {
    fn from(value: u64) -> Self {
        Mask(value)
    }
}

impl FromStr for Mask {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mask::parse(s)
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.to_be_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

fn parse_hex_byte(token: &str) -> Option<u8> {
    // from_str_radix accepts a leading '+', which is not a hex digit
    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}
