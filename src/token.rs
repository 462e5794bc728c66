use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::{Amount, Script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker byte introducing token data inside an output's script field.
const TOKEN_PREFIX: u8 = 0xef;

/// Capability bitfield for a plain transfer: the prefix carries a fungible
/// amount and nothing else.
const HAS_AMOUNT: u8 = 0x10;

/// Relay minimum for an output. Token-transfer outputs carry exactly this
/// many satoshis; the tokens themselves live in the prefix.
pub const DUST: Amount = Amount::from_sat(546);

/// Category of a fungible token, fixed at the token's genesis transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TokenId {
    type Err = InvalidTokenId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidTokenId)?;
        let bytes = <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| InvalidTokenId)?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("token id must be 32 hex-encoded bytes")]
pub struct InvalidTokenId;

/// Serialize an output transferring `token_amount` units of `token_id` to
/// `script_pubkey`, alongside `value` satoshis.
///
/// Wire format: the satoshi value as 8 little-endian bytes, then a
/// compact-size length covering prefix and script together, then the token
/// prefix (marker byte, 32-byte category, capability bitfield, compact-size
/// amount) immediately followed by the script bytes. Any verifier can
/// re-derive the exact bytes from the same inputs.
pub fn transfer_output(
    script_pubkey: &Script,
    token_id: &TokenId,
    token_amount: u64,
    value: Amount,
) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(43 + script_pubkey.len());
    prefixed.push(TOKEN_PREFIX);
    prefixed.extend_from_slice(token_id.as_bytes());
    prefixed.push(HAS_AMOUNT);
    prefixed.extend_from_slice(&serialize(&VarInt(token_amount)));
    prefixed.extend_from_slice(script_pubkey.as_bytes());

    let mut output = Vec::with_capacity(9 + prefixed.len());
    output.extend_from_slice(&value.to_sat().to_le_bytes());
    output.extend_from_slice(&serialize(&VarInt(prefixed.len() as u64)));
    output.extend_from_slice(&prefixed);

    output
}
