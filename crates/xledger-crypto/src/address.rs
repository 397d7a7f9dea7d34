//! Contract address derivation

use crate::hash::{keccak256, sha256};
use xledger_primitives::{Address, Word};

/// Tag byte prefixed to the CREATE2 preimage
const CREATE2_TAG: u8 = 0xFF;

/// Address of a contract created with CREATE:
/// `sha256(caller ++ nonce)[..20]`.
pub fn new_contract_address(caller: &Address, nonce: &[u8]) -> Address {
    let mut preimage = Vec::with_capacity(Address::LEN + nonce.len());
    preimage.extend_from_slice(caller.as_bytes());
    preimage.extend_from_slice(nonce);
    let digest = sha256(&preimage);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[..20]);
    Address::from_bytes(bytes)
}

/// Address of a contract created with CREATE2:
/// `keccak256(0xff ++ caller ++ salt ++ keccak256(init_code))[12..]`.
pub fn new_contract_address2(caller: &Address, salt: &Word, init_code: &[u8]) -> Address {
    let mut preimage = Vec::with_capacity(1 + Address::LEN + 2 * Word::LEN);
    preimage.push(CREATE2_TAG);
    preimage.extend_from_slice(caller.as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(keccak256(init_code).as_bytes());
    Address::from_word(&keccak256(&preimage))
}
