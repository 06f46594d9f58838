//! RFQ relayer library.
//!
//! A permissioned ledger node that records request-for-quote workflows as
//! signed transactions in a hash-linked chain and gossips them between nodes.

pub mod config;
pub mod core;
pub mod crypto;
pub mod network;
pub mod storage;
pub mod types;
pub mod utils;
