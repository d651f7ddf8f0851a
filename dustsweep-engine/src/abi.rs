//! Minimal ABI calldata encoding for the three ERC-20/WETH calls a sweep emits.
//!
//! Every argument is a static 32-byte word, so encoding is the 4-byte
//! selector followed by left-padded words.

use dustsweep_domain::Address;

use crate::error::{EngineError, EngineResult};

/// `approve(address,uint256)`
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `deposit()` on the wrapped native contract
pub const DEPOSIT_SELECTOR: [u8; 4] = [0xd0, 0xe3, 0x0d, 0xb0];

const WORD: usize = 32;

/// Calldata for `approve(spender, amount)`.
pub fn approve_calldata(spender: &Address, amount: u128) -> EngineResult<String> {
    encode_call(APPROVE_SELECTOR, spender, amount)
}

/// Calldata for `transfer(recipient, amount)`.
pub fn transfer_calldata(recipient: &Address, amount: u128) -> EngineResult<String> {
    encode_call(TRANSFER_SELECTOR, recipient, amount)
}

/// Calldata for `deposit()`.
pub fn deposit_calldata() -> String {
    format!("0x{}", hex::encode(DEPOSIT_SELECTOR))
}

/// Read the 4-byte selector from 0x-hex calldata.
pub fn selector_of(data: &str) -> Option<[u8; 4]> {
    let body = data.strip_prefix("0x")?;
    let bytes = hex::decode(body.get(..8)?).ok()?;
    bytes.try_into().ok()
}

fn encode_call(selector: [u8; 4], address: &Address, amount: u128) -> EngineResult<String> {
    let mut buf = Vec::with_capacity(4 + 2 * WORD);
    buf.extend_from_slice(&selector);
    buf.extend_from_slice(&address_word(address)?);
    buf.extend_from_slice(&uint_word(amount));
    Ok(format!("0x{}", hex::encode(buf)))
}

fn address_word(address: &Address) -> EngineResult<[u8; WORD]> {
    let bytes = hex::decode(address.hex_body())
        .map_err(|e| EngineError::InvalidInput(format!("address {} is not hex: {}", address, e)))?;

    let mut word = [0u8; WORD];
    word[WORD - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&value.to_be_bytes());
    word
}
