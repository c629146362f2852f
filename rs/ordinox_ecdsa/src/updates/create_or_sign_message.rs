use crate::endpoints::{CreateOrSignError, MessageKind};
use crate::evm::EvmTransfer;
use crate::finalization::{finalize_message, FinalizationOutcome};
use crate::logs::{DEBUG, INFO};
use crate::state::{audit, mutate_state};
use crate::{CanisterRuntime, MessageId};
use ic_canister_log::log;

/// Records the endorsement of `data` by the caller, creating the message on
/// first submission, and signs the message once it reaches quorum.
///
/// Signing failures are not reported to the caller: the endorsement is kept,
/// the message stays open and finalization is retried later.
pub async fn create_or_sign_message<R: CanisterRuntime>(
    data: String,
    runtime: &R,
) -> Result<MessageId, CreateOrSignError> {
    endorse_and_finalize(MessageKind::Text, data, runtime).await
}

/// Same as [`create_or_sign_message`] for the packed encoding of a token transfer.
/// Transfers are identified by their keccak256 hash, so endorsements of the same
/// transfer accumulate on one message.
pub async fn create_or_sign_evm_message<R: CanisterRuntime>(
    nonce: u64,
    chain_id: u64,
    token_address: String,
    to_address: String,
    amount: String,
    runtime: &R,
) -> Result<MessageId, CreateOrSignError> {
    let transfer = EvmTransfer::new(nonce, chain_id, &token_address, &to_address, &amount)?;
    endorse_and_finalize(MessageKind::EvmTransfer, transfer.message_data(), runtime).await
}

async fn endorse_and_finalize<R: CanisterRuntime>(
    kind: MessageKind,
    data: String,
    runtime: &R,
) -> Result<MessageId, CreateOrSignError> {
    let caller = runtime.caller();
    let (id, awaiting_signature) = mutate_state(|s| {
        s.validate_endorser(&caller)?;
        let id = match s.find_message_id(kind, &data) {
            Some(id) => id,
            None => {
                let id = audit::create_message(s, kind, data, runtime);
                log!(DEBUG, "[create_or_sign_message]: created {kind:?} message {id}");
                id
            }
        };
        if audit::endorse_message(s, id, caller, runtime) {
            log!(
                DEBUG,
                "[create_or_sign_message]: {caller} endorsed message {id}"
            );
        }
        Ok((id, s.message_awaiting_signature(id).is_some()))
    })?;

    if awaiting_signature {
        match finalize_message(id, runtime).await {
            Ok(FinalizationOutcome::InProgress) => {
                log!(
                    DEBUG,
                    "[create_or_sign_message]: message {id} is already being signed"
                );
            }
            Ok(_) => {}
            Err(err) => {
                log!(
                    INFO,
                    "[create_or_sign_message]: failed to sign message {id}: {err}"
                );
            }
        }
    }
    Ok(id)
}
