//! Gossip envelope and the typed bodies it carries.

use crate::core::block::FullBlock;
use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use std::fmt;
use std::io;
use std::ops::RangeInclusive;

/// Upper bound on blocks served in one `Blocks` reply.
pub const MAX_BLOCKS_PER_REPLY: u64 = 100;

/// Discriminant for the envelope payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Tx = 0,
    Block = 1,
    GetStatus = 2,
    Status = 3,
    GetBlocks = 4,
    Blocks = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(MessageType::Tx),
            1 => Ok(MessageType::Block),
            2 => Ok(MessageType::GetStatus),
            3 => Ok(MessageType::Status),
            4 => Ok(MessageType::GetBlocks),
            5 => Ok(MessageType::Blocks),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outer envelope written to the wire. `header` stays a raw tag so that
/// unknown types still decode and can be skipped.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Message {
    pub header: u8,
    /// Node id of the sender
    pub from: String,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(header: MessageType, from: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            header: header as u8,
            from: from.into(),
            data,
        }
    }

    /// Envelope around the borsh encoding of `body`.
    pub fn encode<T: BorshSerialize>(
        header: MessageType,
        from: impl Into<String>,
        body: &T,
    ) -> io::Result<Self> {
        Ok(Self::new(header, from, borsh::to_vec(body)?))
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    /// Encodes `body` straight into a broadcastable frame payload.
    pub fn frame<T: BorshSerialize>(
        header: MessageType,
        from: impl Into<String>,
        body: &T,
    ) -> io::Result<Bytes> {
        Ok(Bytes::from(Self::encode(header, from, body)?.to_bytes()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StatusMessage {
    /// Sender's chain length (height + 1)
    pub current_length: i64,
    pub id: String,
}

/// Request for the inclusive height range `to..=from`.
///
/// `from` is the highest height wanted, `to` the lowest. A responder serves
/// the part of the range it holds, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GetBlocksMessage {
    pub from: u64,
    pub to: u64,
}

impl GetBlocksMessage {
    /// Request made by a node holding `have` headers that wants to reach `target_len`.
    pub fn catch_up(target_len: u64, have: u64) -> Self {
        GetBlocksMessage {
            from: target_len.saturating_sub(1),
            to: have,
        }
    }

    /// Heights a responder at `own_height` answers with, `None` if it has none of them.
    pub fn serve_range(&self, own_height: i64) -> Option<RangeInclusive<u64>> {
        if own_height < 0 {
            return None;
        }
        let low = self.to;
        let high = self.from.min(own_height as u64);
        if low > high {
            return None;
        }
        let high = high.min(low.saturating_add(MAX_BLOCKS_PER_REPLY - 1));
        Some(low..=high)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlocksMessage {
    pub blocks: Vec<FullBlock>,
}
