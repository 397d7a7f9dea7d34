//! # xledger-crypto
//!
//! Cryptographic primitives for the XLedger execution engine.
//!
//! - Keccak-256, SHA-256 and RIPEMD-160 hashing
//! - Contract address derivation (CREATE and CREATE2)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{new_contract_address, new_contract_address2};
pub use hash::{keccak256, ripemd160, sha256};
