//! Decoding raw frames from peers into typed protocol messages.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::network::message::{
    BlocksMessage, GetBlocksMessage, Message, MessageType, StatusMessage,
};
use crate::network::peer::PeerId;
use borsh::BorshDeserialize;
use bytes::Bytes;
use std::net::SocketAddr;

/// One frame read from a peer, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Rpc {
    pub from: PeerId,
    /// Remote address as seen by the local transport
    pub addr: SocketAddr,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("malformed envelope from {addr}: {reason}")]
    Envelope { addr: SocketAddr, reason: String },
    #[error("malformed {kind} payload from {addr}: {reason}")]
    Payload {
        kind: MessageType,
        addr: SocketAddr,
        reason: String,
    },
}

#[derive(Debug)]
pub enum DecodedMessageData {
    Tx(Transaction),
    Block(Block),
    GetStatus,
    Status(StatusMessage),
    GetBlocks(GetBlocksMessage),
    Blocks(BlocksMessage),
    /// A tag this node does not understand
    Unknown(u8),
}

#[derive(Debug)]
pub struct DecodedMessage {
    pub from: PeerId,
    pub addr: SocketAddr,
    /// Node id the sender put in the envelope
    pub sender_id: String,
    pub data: DecodedMessageData,
}

/// Pluggable frame decoder used by the server.
pub type HandleRpcFn = fn(Rpc) -> Result<DecodedMessage, RpcError>;

fn body<T: BorshDeserialize>(kind: MessageType, rpc: &Rpc, data: &[u8]) -> Result<T, RpcError> {
    borsh::from_slice(data).map_err(|e| RpcError::Payload {
        kind,
        addr: rpc.addr,
        reason: e.to_string(),
    })
}

/// Default decoder: envelope first, then the body named by its tag.
pub fn decode_rpc(rpc: Rpc) -> Result<DecodedMessage, RpcError> {
    let msg: Message = borsh::from_slice(&rpc.payload).map_err(|e| RpcError::Envelope {
        addr: rpc.addr,
        reason: e.to_string(),
    })?;

    let data = match MessageType::try_from(msg.header) {
        Ok(kind @ MessageType::Tx) => DecodedMessageData::Tx(body(kind, &rpc, &msg.data)?),
        Ok(kind @ MessageType::Block) => DecodedMessageData::Block(body(kind, &rpc, &msg.data)?),
        Ok(MessageType::GetStatus) => DecodedMessageData::GetStatus,
        Ok(kind @ MessageType::Status) => DecodedMessageData::Status(body(kind, &rpc, &msg.data)?),
        Ok(kind @ MessageType::GetBlocks) => {
            DecodedMessageData::GetBlocks(body(kind, &rpc, &msg.data)?)
        }
        Ok(kind @ MessageType::Blocks) => DecodedMessageData::Blocks(body(kind, &rpc, &msg.data)?),
        Err(tag) => DecodedMessageData::Unknown(tag),
    };

    Ok(DecodedMessage {
        from: rpc.from,
        addr: rpc.addr,
        sender_id: msg.from,
        data,
    })
}
