use crate::endpoints::{InitArg, MessageKind, UpgradeArg};
use crate::evm::parse_transfer_hash;
use crate::state::{SignerSet, State};
use crate::MessageId;
use candid::{CandidType, Deserialize, Principal};
use serde::Serialize;

#[derive(Clone, Debug, Eq, PartialEq, CandidType, Serialize, Deserialize)]
pub enum EventType {
    /// Indicates the canister initialization with the specified argument.
    /// Must be the first event in the log.
    #[serde(rename = "init")]
    Init(InitArg),

    /// Indicates the canister upgrade with the specified argument.
    #[serde(rename = "upgrade")]
    Upgrade(UpgradeArg),

    /// The one-time setup of the signer committee.
    #[serde(rename = "configured_signers")]
    ConfiguredSigners {
        signers: Vec<Principal>,
        threshold: u32,
    },

    /// A payload was submitted for the first time.
    #[serde(rename = "created_message")]
    CreatedMessage {
        id: MessageId,
        #[serde(default)]
        kind: MessageKind,
        data: String,
    },

    /// A signer endorsed a message.
    #[serde(rename = "endorsed_message")]
    EndorsedMessage { id: MessageId, signer: Principal },

    /// The message reached quorum and its signature was recorded.
    #[serde(rename = "finalized_message")]
    FinalizedMessage { id: MessageId, signature: String },
}

#[derive(Clone, Debug, Eq, PartialEq, CandidType, Serialize, Deserialize)]
pub struct Event {
    /// The canister time at which the event was recorded, in nanoseconds.
    #[serde(rename = "timestamp")]
    pub timestamp: u64,
    /// The event type.
    #[serde(rename = "payload")]
    pub payload: EventType,
}

#[derive(Debug, Eq, PartialEq)]
pub enum ReplayLogError {
    /// There are no events in the event log.
    EmptyLog,
    /// The event log is inconsistent.
    InconsistentLog(String),
}

/// Reconstructs the canister state from the event log.
pub fn replay_events<I>(mut events: I) -> Result<State, ReplayLogError>
where
    I: Iterator<Item = Event>,
{
    let mut state = match events.next() {
        Some(Event {
            payload: EventType::Init(args),
            ..
        }) => State::try_from(args).map_err(|err| {
            ReplayLogError::InconsistentLog(format!("failed to initialize state: {err:?}"))
        })?,
        Some(event) => {
            return Err(ReplayLogError::InconsistentLog(format!(
                "The first event is not Init: {event:?}"
            )));
        }
        None => return Err(ReplayLogError::EmptyLog),
    };

    for event in events {
        match event.payload {
            EventType::Init(args) => {
                return Err(ReplayLogError::InconsistentLog(format!(
                    "state re-initialization is not allowed: {args:?}"
                )));
            }
            EventType::Upgrade(args) => state.upgrade(args).map_err(|err| {
                ReplayLogError::InconsistentLog(format!("failed to upgrade state: {err:?}"))
            })?,
            EventType::ConfiguredSigners { signers, threshold } => {
                if state.signer_set.is_some() {
                    return Err(ReplayLogError::InconsistentLog(
                        "signer set configured twice".to_string(),
                    ));
                }
                let signer_set = SignerSet::new(signers, threshold).map_err(|err| {
                    ReplayLogError::InconsistentLog(format!("invalid signer set: {err}"))
                })?;
                state.configure_signers(signer_set);
            }
            EventType::CreatedMessage { id, kind, data } => {
                if id != state.next_id || state.find_message_id(kind, &data).is_some() {
                    return Err(ReplayLogError::InconsistentLog(format!(
                        "unexpected creation of message {id}, next id is {}",
                        state.next_id
                    )));
                }
                if kind == MessageKind::EvmTransfer && parse_transfer_hash(&data).is_none() {
                    return Err(ReplayLogError::InconsistentLog(format!(
                        "message {id} holds a malformed transfer hash {data}"
                    )));
                }
                state.create_message(id, kind, data);
            }
            EventType::EndorsedMessage { id, signer } => {
                if state.message(id).is_none() {
                    return Err(ReplayLogError::InconsistentLog(format!(
                        "endorsement of unknown message {id}"
                    )));
                }
                state.endorse_message(id, signer);
            }
            EventType::FinalizedMessage { id, signature } => {
                match state.message(id) {
                    Some(message) if message.signature.is_none() => {}
                    Some(_) => {
                        return Err(ReplayLogError::InconsistentLog(format!(
                            "message {id} finalized twice"
                        )));
                    }
                    None => {
                        return Err(ReplayLogError::InconsistentLog(format!(
                            "finalization of unknown message {id}"
                        )));
                    }
                }
                state.finalize_message(id, signature);
            }
        }
    }

    Ok(state)
}
