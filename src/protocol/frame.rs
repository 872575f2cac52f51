//! Frame definitions
//!
//! Message codes and the two shapes a frame can take.

use crate::contest::Contestant;

/// Leading byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCode {
    Normal = 0x00,
    Error = 0x01,
}

impl TryFrom<u8> for MessageCode {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        match byte {
            0x00 => Ok(MessageCode::Normal),
            0x01 => Ok(MessageCode::Error),
            other => Err(other),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A request or response: zero or more contestants
    Normal(Vec<Contestant>),

    /// A failure description from the peer
    Error(String),
}
