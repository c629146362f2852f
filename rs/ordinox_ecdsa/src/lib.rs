use crate::management::CallError;
use async_trait::async_trait;
use candid::Principal;
use std::time::Duration;

pub mod endpoints;
pub mod evm;
pub mod finalization;
pub mod guard;
pub mod lifecycle;
pub mod logs;
pub mod management;
pub mod metrics;
pub mod queries;
pub mod signer;
pub mod state;
pub mod storage;
pub mod updates;

#[cfg(test)]
pub mod test_fixtures;

/// Identifier of a message in the ledger, assigned in creation order.
pub type MessageId = u64;

/// The derivation path of the single key the canister signs with.
pub const MAIN_DERIVATION_PATH: Vec<Vec<u8>> = vec![];

/// How often the canister retries finalizing messages that reached quorum
/// but whose signing call failed.
pub const FINALIZATION_RETRY_INTERVAL: Duration = Duration::from_secs(60);

pub const IC_CANISTER_RUNTIME: IcCanisterRuntime = IcCanisterRuntime {};

/// Everything the coordinator needs from the system it runs on.
#[async_trait]
pub trait CanisterRuntime {
    /// Returns the principal that sent the current message.
    fn caller(&self) -> Principal;

    /// Gets current timestamp, in nanoseconds since the epoch (1970-01-01).
    fn time(&self) -> u64;

    /// Fetches the SEC1-encoded public key of the canister threshold ECDSA key.
    async fn ecdsa_public_key(
        &self,
        key_name: String,
        derivation_path: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, CallError>;

    /// Signs a 32-byte digest with the canister threshold ECDSA key.
    async fn sign_with_ecdsa(
        &self,
        key_name: String,
        derivation_path: Vec<Vec<u8>>,
        message_hash: [u8; 32],
    ) -> Result<Vec<u8>, CallError>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct IcCanisterRuntime {}

#[async_trait]
impl CanisterRuntime for IcCanisterRuntime {
    fn caller(&self) -> Principal {
        ic_cdk::caller()
    }

    fn time(&self) -> u64 {
        ic_cdk::api::time()
    }

    async fn ecdsa_public_key(
        &self,
        key_name: String,
        derivation_path: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, CallError> {
        management::ecdsa_public_key(key_name, derivation_path).await
    }

    async fn sign_with_ecdsa(
        &self,
        key_name: String,
        derivation_path: Vec<Vec<u8>>,
        message_hash: [u8; 32],
    ) -> Result<Vec<u8>, CallError> {
        management::sign_with_ecdsa(key_name, derivation_path, message_hash).await
    }
}
