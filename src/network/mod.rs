//! Peer-to-peer layer.
//!
//! - [`transport`]: TCP listener, dialer and frame codec
//! - [`peer`]: connection handles, read loops and the peer registry
//! - [`message`]: gossip envelope and typed bodies
//! - [`rpc`]: frame decoding into typed messages
//! - [`txpool`]: pending transactions
//! - [`sync`]: status gossip and block catch-up
//! - [`server`]: the node's central loop

pub mod message;
pub mod peer;
pub mod rpc;
pub mod server;
pub mod sync;
pub mod transport;
pub mod txpool;
