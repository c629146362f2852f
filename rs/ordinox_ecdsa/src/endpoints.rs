//! Candid types of the canister interface.

use crate::state::event::Event;
use crate::MessageId;
use candid::{CandidType, Deserialize, Principal};
use serde::Serialize;

#[derive(CandidType, Deserialize, Clone, Debug)]
pub enum CoordinatorArg {
    Init(InitArg),
    Upgrade(Option<UpgradeArg>),
}

#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InitArg {
    /// The name of the threshold ECDSA key. Use "dfx_test_key" for a local
    /// replica and "key_1" for mainnet.
    pub ecdsa_key_name: String,
    /// The only principal allowed to configure the signer set, if any.
    /// When absent, any caller may perform the one-time setup.
    #[serde(default)]
    pub setup_authority: Option<Principal>,
}

#[derive(CandidType, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpgradeArg {
    #[serde(default)]
    pub ecdsa_key_name: Option<String>,
}

/// How the payload of a message is turned into the bytes that get signed.
#[derive(
    CandidType, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum MessageKind {
    /// The payload is signed as is.
    #[default]
    Text,
    /// The payload is the `0x`-prefixed keccak256 hash of a packed EVM transfer,
    /// and the 32 hash bytes are signed.
    EvmTransfer,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub data: String,
    pub signers: Vec<Principal>,
    pub signature: Option<String>,
}

/// Read-only snapshot of the coordinator.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorState {
    pub threshold: u32,
    pub messages: Vec<Message>,
    pub signers: Vec<Principal>,
    pub next_id: MessageId,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("the signer set is already configured")]
    AlreadyConfigured,
    #[error("caller {0} is not allowed to configure the signer set")]
    NotAuthorized(Principal),
    #[error("the signer set must contain at least one signer")]
    NoSigners,
    #[error("signer {0} appears more than once")]
    DuplicateSigner(Principal),
    #[error("threshold {threshold} must be between 1 and the number of signers ({num_signers})")]
    InvalidThreshold { threshold: u32, num_signers: u64 },
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CreateOrSignError {
    #[error("the signer set is not configured yet")]
    NotConfigured,
    #[error("caller {0} is not an authorized signer")]
    NotAuthorized(Principal),
    #[error("invalid EVM address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct GetEventsArg {
    pub start: u64,
    pub length: u64,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct GetEventsResult {
    pub events: Vec<Event>,
    pub total_event_count: u64,
}
