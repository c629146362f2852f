//! Transition of messages that reached quorum into the finalized state.


use crate::guard::{FinalizationGuard, GuardError, TimerGuard};
use crate::logs::{DEBUG, INFO};
use crate::metrics::observe_finalization_failure;
use crate::signer::{sign_message, SignError};
use crate::state::{audit, mutate_state, read_state, Message};
use crate::{CanisterRuntime, MessageId};
use ic_canister_log::log;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FinalizationOutcome {
    /// The signature was computed and recorded.
    Finalized { signature: String },
    /// The message is unknown, already signed or still below quorum.
    NothingToDo,
    /// Another call is signing the message.
    InProgress,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FinalizationError {
    #[error("too many concurrent signing requests")]
    TooManyConcurrentRequests,
    #[error("failed to sign message: {0}")]
    Signing(#[from] SignError),
}

/// Signs the message if it reached quorum and records the signature.
///
/// The endorsements are already persisted when this function is called:
/// on failure the message stays open and a later call retries.
pub async fn finalize_message<R: CanisterRuntime>(
    id: MessageId,
    runtime: &R,
) -> Result<FinalizationOutcome, FinalizationError> {
    let _guard = match FinalizationGuard::new(id) {
        Ok(guard) => guard,
        Err(GuardError::AlreadyProcessing) => return Ok(FinalizationOutcome::InProgress),
        Err(GuardError::TooManyConcurrentRequests) => {
            return Err(FinalizationError::TooManyConcurrentRequests)
        }
    };

    let payload = match read_state(|s| {
        s.message_awaiting_signature(id)
            .map(Message::signing_payload)
    }) {
        Some(payload) => payload,
        None => return Ok(FinalizationOutcome::NothingToDo),
    };

    let signature = sign_message(&payload, runtime).await.map_err(|err| {
        observe_finalization_failure();
        err
    })?;

    let recorded = mutate_state(|s| {
        if s.message_awaiting_signature(id).is_some() {
            audit::finalize_message(s, id, signature.clone(), runtime);
            true
        } else {
            false
        }
    });
    if !recorded {
        return Ok(FinalizationOutcome::NothingToDo);
    }
    log!(INFO, "[finalize_message]: message {id} signed: {signature}");
    Ok(FinalizationOutcome::Finalized { signature })
}

/// Retries the finalization of all messages that reached quorum but are not
/// signed yet, typically because an earlier signing call failed.
pub async fn retry_pending_finalizations<R: CanisterRuntime>(runtime: R) {
    let _guard = match TimerGuard::new() {
        Some(guard) => guard,
        None => return,
    };

    let pending = read_state(|s| s.messages_awaiting_signature());
    if pending.is_empty() {
        return;
    }
    log!(
        DEBUG,
        "[retry_pending_finalizations]: retrying finalization of {} messages",
        pending.len()
    );
    for id in pending {
        match finalize_message(id, &runtime).await {
            Ok(_) => {}
            Err(FinalizationError::TooManyConcurrentRequests) => {
                log!(
                    DEBUG,
                    "[retry_pending_finalizations]: too many concurrent signing requests, retrying later"
                );
                return;
            }
            Err(err) => {
                log!(
                    INFO,
                    "[retry_pending_finalizations]: failed to finalize message {id}: {err}"
                );
            }
        }
    }
}
