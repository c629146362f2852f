//! State modifications that must be recorded in the event log.
//! Every function records the event first, then applies it to the state,
//! so that replaying the log yields the same state.

use super::{SignerSet, State};
use crate::endpoints::MessageKind;
use crate::state::event::EventType;
use crate::storage::record_event;
use crate::{CanisterRuntime, MessageId};
use candid::Principal;

pub fn configure_signers<R: CanisterRuntime>(
    state: &mut State,
    signer_set: SignerSet,
    runtime: &R,
) {
    record_event(
        EventType::ConfiguredSigners {
            signers: signer_set.signers().to_vec(),
            threshold: signer_set.threshold(),
        },
        runtime,
    );
    state.configure_signers(signer_set);
}

/// Creates a new open message for `data` and returns its identifier.
pub fn create_message<R: CanisterRuntime>(
    state: &mut State,
    kind: MessageKind,
    data: String,
    runtime: &R,
) -> MessageId {
    let id = state.next_id;
    record_event(
        EventType::CreatedMessage {
            id,
            kind,
            data: data.clone(),
        },
        runtime,
    );
    state.create_message(id, kind, data);
    id
}

/// Records the endorsement of `signer`.
/// Returns `false` and records nothing if the signer already endorsed the message.
pub fn endorse_message<R: CanisterRuntime>(
    state: &mut State,
    id: MessageId,
    signer: Principal,
    runtime: &R,
) -> bool {
    let message = state
        .message(id)
        .unwrap_or_else(|| panic!("BUG: cannot endorse unknown message {id}"));
    if message.is_endorsed_by(&signer) {
        return false;
    }
    record_event(EventType::EndorsedMessage { id, signer }, runtime);
    state.endorse_message(id, signer)
}

pub fn finalize_message<R: CanisterRuntime>(
    state: &mut State,
    id: MessageId,
    signature: String,
    runtime: &R,
) {
    record_event(
        EventType::FinalizedMessage {
            id,
            signature: signature.clone(),
        },
        runtime,
    );
    state.finalize_message(id, signature);
}
