//! Core ledger data structures.
//!
//! - `Transaction`: typed, signed envelope for one RFQ lifecycle stage
//! - `Block` / `Header`: hash-linked container of transactions
//! - `Blockchain`: the ledger, owning the header chain and the RFQ tables
//! - `RfqLifecycle`: validator-side open/close driver

pub mod block;
pub mod blockchain;
pub mod lifecycle;
pub mod rfq;
pub mod transaction;
pub mod validator;
