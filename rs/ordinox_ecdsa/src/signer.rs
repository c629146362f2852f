//! Signing capability of the coordinator: Ethereum personal-message signatures
//! (EIP-191) produced with the canister threshold ECDSA key.


use crate::logs::DEBUG;
use crate::management::CallError;
use crate::state::{mutate_state, read_state};
use crate::{CanisterRuntime, MAIN_DERIVATION_PATH};
use ic_canister_log::log;
use ic_sha3::Keccak256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

const EIP191_PREFIX: &str = "\x19Ethereum Signed Message:\n";

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SignError {
    #[error(transparent)]
    ManagementCall(#[from] CallError),
    #[error("invalid canister public key {public_key}: {reason}")]
    InvalidPublicKey { public_key: String, reason: String },
    #[error("invalid signature {signature}: {reason}")]
    InvalidSignature { signature: String, reason: String },
    #[error("failed to recover the canister public key from signature {signature}")]
    RecoveryFailed { signature: String },
}

/// Hash of a message as computed by Ethereum `personal_sign`:
/// keccak256("\x19Ethereum Signed Message:\n" || len(message) || message).
pub fn personal_message_digest(message: &[u8]) -> [u8; 32] {
    let mut bytes = Vec::with_capacity(EIP191_PREFIX.len() + 20 + message.len());
    bytes.extend_from_slice(EIP191_PREFIX.as_bytes());
    bytes.extend_from_slice(message.len().to_string().as_bytes());
    bytes.extend_from_slice(message);
    Keccak256::hash(bytes)
}

/// Signs the personal-message digest of `message` and returns the signature
/// as `0x`-prefixed hex of `r || s || v`, with `v` in {27, 28}.
pub async fn sign_message<R: CanisterRuntime>(
    message: &[u8],
    runtime: &R,
) -> Result<String, SignError> {
    let digest = personal_message_digest(message);
    let key_name = read_state(|s| s.ecdsa_key_name.clone());
    let public_key = lazy_ecdsa_public_key(runtime).await?;
    let raw_signature = runtime
        .sign_with_ecdsa(key_name, MAIN_DERIVATION_PATH, digest)
        .await?;
    encode_recoverable_signature(&public_key, &digest, &raw_signature)
}

/// Computes the recovery id of a 64-byte `r || s` signature by trial recovery
/// against the signing public key and appends it as Ethereum `v`.
pub fn encode_recoverable_signature(
    public_key: &[u8],
    digest: &[u8; 32],
    raw_signature: &[u8],
) -> Result<String, SignError> {
    let verifying_key = parse_public_key(public_key)?;
    let signature =
        Signature::from_slice(raw_signature).map_err(|e| SignError::InvalidSignature {
            signature: hex::encode(raw_signature),
            reason: e.to_string(),
        })?;
    let signature = signature.normalize_s().unwrap_or(signature);
    let recovery_id = RecoveryId::trial_recovery_from_prehash(&verifying_key, digest, &signature)
        .map_err(|_| SignError::RecoveryFailed {
            signature: hex::encode(raw_signature),
        })?;

    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(27 + u8::from(recovery_id.is_y_odd()));
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Returns the canister public key, fetching it from the management canister
/// on first use.
pub async fn lazy_ecdsa_public_key<R: CanisterRuntime>(runtime: &R) -> Result<Vec<u8>, SignError> {
    if let Some(public_key) = read_state(|s| s.ecdsa_public_key.clone()) {
        return Ok(public_key);
    }
    let key_name = read_state(|s| s.ecdsa_key_name.clone());
    let public_key = runtime
        .ecdsa_public_key(key_name.clone(), MAIN_DERIVATION_PATH)
        .await?;
    parse_public_key(&public_key)?;
    log!(
        DEBUG,
        "[lazy_ecdsa_public_key]: fetched public key {} of key {key_name}",
        hex::encode(&public_key)
    );
    mutate_state(|s| s.ecdsa_public_key = Some(public_key.clone()));
    Ok(public_key)
}

/// Ethereum address of the given SEC1 public key, EIP-55 checksummed.
pub fn evm_address(public_key: &[u8]) -> Result<String, SignError> {
    let verifying_key = parse_public_key(public_key)?;
    let point = verifying_key.to_encoded_point(false);
    // Skip the 0x04 tag of the uncompressed encoding.
    let hash = Keccak256::hash(&point.as_bytes()[1..]);
    Ok(to_checksum_address(&hash[12..]))
}

fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::hash(lower.as_bytes());
    let checksummed: String = lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();
    format!("0x{checksummed}")
}

fn parse_public_key(public_key: &[u8]) -> Result<VerifyingKey, SignError> {
    VerifyingKey::from_sec1_bytes(public_key).map_err(|e| SignError::InvalidPublicKey {
        public_key: hex::encode(public_key),
        reason: e.to_string(),
    })
}
