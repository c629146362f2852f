//! Calls to the threshold ECDSA API of the management canister.

use ic_cdk::api::call::RejectionCode;
use ic_cdk::api::management_canister::ecdsa::{
    EcdsaCurve, EcdsaKeyId, EcdsaPublicKeyArgument, SignWithEcdsaArgument,
};
use std::fmt;

/// Represents an error from a management canister call, such as
/// `sign_with_ecdsa`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CallError {
    method: String,
    reason: Reason,
}

impl CallError {
    pub fn new(method: impl Into<String>, reason: Reason) -> Self {
        Self {
            method: method.into(),
            reason,
        }
    }

    /// Returns the name of the method that resulted in this error.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &Reason {
        &self.reason
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "management call '{}' failed: {}",
            self.method, self.reason
        )
    }
}

impl std::error::Error for CallError {}

#[derive(Clone, Eq, PartialEq, Debug)]
/// The reason for the management call failure.
pub enum Reason {
    /// The canister does not have enough cycles to submit the request.
    OutOfCycles,
    /// The call failed with an error.
    CanisterError(String),
    /// The management canister rejected the signature request (not enough
    /// cycles, the ECDSA subnet is overloaded, etc.).
    Rejected(String),
    /// The call failed with a transient error. Retrying may help.
    TransientInternalError(String),
    /// The call failed with a non-transient error. Retrying will not help.
    InternalError(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfCycles => write!(fmt, "the canister is out of cycles"),
            Self::CanisterError(msg) => write!(fmt, "canister error: {msg}"),
            Self::Rejected(msg) => {
                write!(fmt, "the management canister rejected the call: {msg}")
            }
            Self::TransientInternalError(msg) => write!(fmt, "transient internal error: {msg}"),
            Self::InternalError(msg) => write!(fmt, "internal error: {msg}"),
        }
    }
}

impl Reason {
    fn from_reject(reject_code: RejectionCode, reject_message: String) -> Self {
        match reject_code {
            RejectionCode::SysTransient => Self::TransientInternalError(reject_message),
            RejectionCode::CanisterError => Self::CanisterError(reject_message),
            RejectionCode::CanisterReject => Self::Rejected(reject_message),
            RejectionCode::NoError
            | RejectionCode::SysFatal
            | RejectionCode::DestinationInvalid
            | RejectionCode::Unknown => Self::InternalError(format!(
                "rejection code: {reject_code:?}, rejection message: {reject_message}"
            )),
        }
    }
}

fn secp256k1_key_id(key_name: String) -> EcdsaKeyId {
    EcdsaKeyId {
        curve: EcdsaCurve::Secp256k1,
        name: key_name,
    }
}

/// Fetches the SEC1-encoded ECDSA public key of the canister.
pub async fn ecdsa_public_key(
    key_name: String,
    derivation_path: Vec<Vec<u8>>,
) -> Result<Vec<u8>, CallError> {
    use ic_cdk::api::management_canister::ecdsa::ecdsa_public_key;

    ecdsa_public_key(EcdsaPublicKeyArgument {
        canister_id: None,
        derivation_path,
        key_id: secp256k1_key_id(key_name),
    })
    .await
    .map(|(response,)| response.public_key)
    .map_err(|(code, msg)| CallError::new("ecdsa_public_key", Reason::from_reject(code, msg)))
}

/// Signs a message hash using the tECDSA API.
pub async fn sign_with_ecdsa(
    key_name: String,
    derivation_path: Vec<Vec<u8>>,
    message_hash: [u8; 32],
) -> Result<Vec<u8>, CallError> {
    use ic_cdk::api::management_canister::ecdsa::sign_with_ecdsa;

    sign_with_ecdsa(SignWithEcdsaArgument {
        message_hash: message_hash.to_vec(),
        derivation_path,
        key_id: secp256k1_key_id(key_name),
    })
    .await
    .map(|(reply,)| reply.signature)
    .map_err(|(code, msg)| CallError::new("sign_with_ecdsa", Reason::from_reject(code, msg)))
}
