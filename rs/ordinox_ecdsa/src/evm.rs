//! Token transfers destined to an EVM contract.
//!
//! A transfer is endorsed and signed through its packed encoding
//! `nonce || chain_id || token_address || to_address || amount`,
//! where `nonce` and `chain_id` are 16-byte big-endian integers,
//! the addresses are 20 bytes each and `amount` is a 32-byte big-endian integer.
//! The contract verifies an EIP-191 signature over the 32 bytes of
//! `keccak256(packed)`.


use crate::endpoints::CreateOrSignError;
use ethnum::u256;
use ic_sha3::Keccak256;

pub const ADDRESS_LENGTH: usize = 20;
pub const PACKED_LENGTH: usize = 16 + 16 + ADDRESS_LENGTH + ADDRESS_LENGTH + 32;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EvmTransfer {
    pub nonce: u128,
    pub chain_id: u128,
    pub token_address: [u8; ADDRESS_LENGTH],
    pub to_address: [u8; ADDRESS_LENGTH],
    pub amount: u256,
}

impl EvmTransfer {
    /// Parses the endpoint arguments. Addresses are hex with an optional `0x`
    /// prefix, in any case. The amount is a decimal integer in the token's
    /// smallest unit.
    pub fn new(
        nonce: u64,
        chain_id: u64,
        token_address: &str,
        to_address: &str,
        amount: &str,
    ) -> Result<Self, CreateOrSignError> {
        Ok(Self {
            nonce: u128::from(nonce),
            chain_id: u128::from(chain_id),
            token_address: parse_address(token_address)?,
            to_address: parse_address(to_address)?,
            amount: parse_amount(amount)?,
        })
    }

    pub fn encode_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(PACKED_LENGTH);
        packed.extend_from_slice(&self.nonce.to_be_bytes());
        packed.extend_from_slice(&self.chain_id.to_be_bytes());
        packed.extend_from_slice(&self.token_address);
        packed.extend_from_slice(&self.to_address);
        packed.extend_from_slice(&self.amount.to_be_bytes());
        packed
    }

    pub fn hash(&self) -> [u8; 32] {
        Keccak256::hash(self.encode_packed())
    }

    /// The payload under which the transfer is stored and deduplicated.
    pub fn message_data(&self) -> String {
        format!("0x{}", hex::encode(self.hash()))
    }
}

/// Inverse of [`EvmTransfer::message_data`].
pub fn parse_transfer_hash(data: &str) -> Option<[u8; 32]> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(data.strip_prefix("0x")?, &mut hash).ok()?;
    Some(hash)
}

fn parse_address(address: &str) -> Result<[u8; ADDRESS_LENGTH], CreateOrSignError> {
    let invalid = |reason: String| CreateOrSignError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    let digits = address.strip_prefix("0x").unwrap_or(address);
    let bytes = hex::decode(digits).map_err(|e| invalid(e.to_string()))?;
    <[u8; ADDRESS_LENGTH]>::try_from(bytes.as_slice()).map_err(|_| {
        invalid(format!(
            "expected {ADDRESS_LENGTH} bytes, got {}",
            bytes.len()
        ))
    })
}

fn parse_amount(amount: &str) -> Result<u256, CreateOrSignError> {
    let invalid = |reason: String| CreateOrSignError::InvalidAmount {
        amount: amount.to_string(),
        reason,
    };
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative decimal integer".to_string()));
    }
    u256::from_str_radix(amount, 10).map_err(|e| invalid(e.to_string()))
}
