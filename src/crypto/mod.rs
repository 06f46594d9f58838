//! secp256k1 keys and recoverable signatures.

pub mod key_pair;
