//! State management module.
//!
//! The state is stored in the global thread-level variable `__STATE`.
//! This module provides utility functions to manage the state. Most
//! code should use those functions instead of touching `__STATE` directly.
use crate::endpoints::{
    self, CoordinatorState, CreateOrSignError, InitArg, MessageKind, SetupError, UpgradeArg,
};
use crate::evm::parse_transfer_hash;
use crate::MessageId;
use candid::Principal;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

pub mod audit;
pub mod event;


thread_local! {
    static __STATE: RefCell<Option<State>> = RefCell::default();
}

/// The committee of principals allowed to endorse messages, together with
/// the number of endorsements required to sign a message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SignerSet {
    signers: Vec<Principal>,
    threshold: u32,
}

impl SignerSet {
    pub fn new(signers: Vec<Principal>, threshold: u32) -> Result<Self, SetupError> {
        if signers.is_empty() {
            return Err(SetupError::NoSigners);
        }
        let mut distinct = BTreeSet::new();
        for signer in &signers {
            if !distinct.insert(signer) {
                return Err(SetupError::DuplicateSigner(*signer));
            }
        }
        if threshold == 0 || threshold as usize > signers.len() {
            return Err(SetupError::InvalidThreshold {
                threshold,
                num_signers: signers.len() as u64,
            });
        }
        Ok(Self { signers, threshold })
    }

    pub fn signers(&self) -> &[Principal] {
        &self.signers
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn contains(&self, principal: &Principal) -> bool {
        self.signers.contains(principal)
    }

    pub fn is_quorum(&self, num_endorsements: usize) -> bool {
        num_endorsements >= self.threshold as usize
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum MessageStatus {
    /// Endorsements are accumulating, no signature yet.
    Open,
    /// The signature was recorded. Terminal.
    Finalized,
}

/// A payload submitted for signing together with the signers that endorsed it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub data: String,
    /// Endorsing principals in the order they endorsed, each at most once.
    pub signers: Vec<Principal>,
    pub signature: Option<String>,
}

impl Message {
    pub fn new(id: MessageId, kind: MessageKind, data: String) -> Self {
        Self {
            id,
            kind,
            data,
            signers: vec![],
            signature: None,
        }
    }

    pub fn status(&self) -> MessageStatus {
        match self.signature {
            Some(_) => MessageStatus::Finalized,
            None => MessageStatus::Open,
        }
    }

    /// The bytes covered by the personal-sign digest of this message.
    pub fn signing_payload(&self) -> Vec<u8> {
        match self.kind {
            MessageKind::Text => self.data.as_bytes().to_vec(),
            MessageKind::EvmTransfer => parse_transfer_hash(&self.data)
                .unwrap_or_else(|| {
                    panic!(
                        "BUG: message {} holds a malformed transfer hash {}",
                        self.id, self.data
                    )
                })
                .to_vec(),
        }
    }

    pub fn is_endorsed_by(&self, signer: &Principal) -> bool {
        self.signers.contains(signer)
    }

    /// Adds the signer to the endorsers.
    /// Returns `false` if the signer had already endorsed the message.
    fn endorse(&mut self, signer: Principal) -> bool {
        if self.is_endorsed_by(&signer) {
            return false;
        }
        self.signers.push(signer);
        true
    }
}

impl From<&Message> for endpoints::Message {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            kind: message.kind,
            data: message.data.clone(),
            signers: message.signers.clone(),
            signature: message.signature.clone(),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum InvalidStateError {
    InvalidEcdsaKeyName(String),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct State {
    /// The name of the threshold ECDSA key used to sign messages.
    pub ecdsa_key_name: String,

    /// The only principal allowed to call `setup`, if any.
    pub setup_authority: Option<Principal>,

    /// The committee, `None` until `setup` succeeds.
    pub signer_set: Option<SignerSet>,

    /// All messages ever submitted.
    pub messages: BTreeMap<MessageId, Message>,

    /// Index of `messages` by kind and payload.
    pub message_ids: BTreeMap<(MessageKind, String), MessageId>,

    /// The identifier of the next message to be created.
    pub next_id: MessageId,

    /// Cached SEC1-encoded public key of the canister, not persisted.
    pub ecdsa_public_key: Option<Vec<u8>>,

    /// Messages with a signing request in flight.
    pub pending_finalizations: BTreeSet<MessageId>,

    /// Whether the finalization retry task is running.
    pub is_timer_running: bool,
}

impl TryFrom<InitArg> for State {
    type Error = InvalidStateError;

    fn try_from(
        InitArg {
            ecdsa_key_name,
            setup_authority,
        }: InitArg,
    ) -> Result<Self, Self::Error> {
        let state = Self {
            ecdsa_key_name,
            setup_authority,
            signer_set: None,
            messages: BTreeMap::new(),
            message_ids: BTreeMap::new(),
            next_id: 0,
            ecdsa_public_key: None,
            pending_finalizations: BTreeSet::new(),
            is_timer_running: false,
        };
        state.validate_config()?;
        Ok(state)
    }
}

impl State {
    pub fn validate_config(&self) -> Result<(), InvalidStateError> {
        if self.ecdsa_key_name.trim().is_empty() {
            return Err(InvalidStateError::InvalidEcdsaKeyName(
                "ecdsa_key_name cannot be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn upgrade(
        &mut self,
        UpgradeArg { ecdsa_key_name }: UpgradeArg,
    ) -> Result<(), InvalidStateError> {
        if let Some(key_name) = ecdsa_key_name {
            self.ecdsa_key_name = key_name;
            self.ecdsa_public_key = None;
        }
        self.validate_config()
    }

    pub fn threshold(&self) -> Option<u32> {
        self.signer_set.as_ref().map(SignerSet::threshold)
    }

    /// Checks that `caller` may configure the signer set and builds it.
    pub fn validate_setup(
        &self,
        caller: &Principal,
        signers: Vec<Principal>,
        threshold: u32,
    ) -> Result<SignerSet, SetupError> {
        if let Some(authority) = &self.setup_authority {
            if authority != caller {
                return Err(SetupError::NotAuthorized(*caller));
            }
        }
        if self.signer_set.is_some() {
            return Err(SetupError::AlreadyConfigured);
        }
        SignerSet::new(signers, threshold)
    }

    /// Checks that `caller` may endorse messages.
    pub fn validate_endorser(&self, caller: &Principal) -> Result<(), CreateOrSignError> {
        match &self.signer_set {
            None => Err(CreateOrSignError::NotConfigured),
            Some(signer_set) if !signer_set.contains(caller) => {
                Err(CreateOrSignError::NotAuthorized(*caller))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn find_message_id(&self, kind: MessageKind, data: &str) -> Option<MessageId> {
        self.message_ids.get(&(kind, data.to_string())).copied()
    }

    /// Looks up a text message by its payload.
    pub fn message_id(&self, data: &str) -> Option<MessageId> {
        self.find_message_id(MessageKind::Text, data)
    }

    pub fn message_by_data(&self, data: &str) -> Option<&Message> {
        self.message_id(data).and_then(|id| self.message(id))
    }

    /// Returns the message if it reached quorum but is not signed yet.
    pub fn message_awaiting_signature(&self, id: MessageId) -> Option<&Message> {
        let signer_set = self.signer_set.as_ref()?;
        self.message(id).filter(|message| {
            message.status() == MessageStatus::Open && signer_set.is_quorum(message.signers.len())
        })
    }

    pub fn messages_awaiting_signature(&self) -> Vec<MessageId> {
        self.messages
            .keys()
            .copied()
            .filter(|id| self.message_awaiting_signature(*id).is_some())
            .collect()
    }

    /// Signature of the message with payload `data`. Transfers are looked up by
    /// their `0x`-prefixed hash when no text message has that payload.
    pub fn signature(&self, data: &str) -> Option<&str> {
        [MessageKind::Text, MessageKind::EvmTransfer]
            .into_iter()
            .find_map(|kind| self.find_message_id(kind, data))
            .and_then(|id| self.message(id))
            .and_then(|message| message.signature.as_deref())
    }

    pub fn count_messages(&self, status: MessageStatus) -> usize {
        self.messages
            .values()
            .filter(|message| message.status() == status)
            .count()
    }

    fn configure_signers(&mut self, signer_set: SignerSet) {
        assert_eq!(
            self.signer_set, None,
            "BUG: the signer set is already configured"
        );
        self.signer_set = Some(signer_set);
    }

    fn create_message(&mut self, id: MessageId, kind: MessageKind, data: String) {
        assert_eq!(
            id, self.next_id,
            "BUG: message identifiers must be assigned in order"
        );
        let key = (kind, data);
        assert!(
            !self.message_ids.contains_key(&key),
            "BUG: message {id} duplicates the payload of message {:?}",
            self.message_ids.get(&key)
        );
        self.next_id = id
            .checked_add(1)
            .expect("BUG: message identifier overflow");
        let (kind, data) = key.clone();
        self.message_ids.insert(key, id);
        self.messages.insert(id, Message::new(id, kind, data));
    }

    fn endorse_message(&mut self, id: MessageId, signer: Principal) -> bool {
        self.messages
            .get_mut(&id)
            .unwrap_or_else(|| panic!("BUG: cannot endorse unknown message {id}"))
            .endorse(signer)
    }

    fn finalize_message(&mut self, id: MessageId, signature: String) {
        let message = self
            .messages
            .get_mut(&id)
            .unwrap_or_else(|| panic!("BUG: cannot finalize unknown message {id}"));
        assert_eq!(
            message.signature, None,
            "BUG: message {id} is already finalized"
        );
        message.signature = Some(signature);
    }

    pub fn snapshot(&self) -> CoordinatorState {
        CoordinatorState {
            threshold: self.threshold().unwrap_or_default(),
            messages: self.messages.values().map(endpoints::Message::from).collect(),
            signers: self
                .signer_set
                .as_ref()
                .map(|signer_set| signer_set.signers().to_vec())
                .unwrap_or_default(),
            next_id: self.next_id,
        }
    }

    /// Checks whether the persistent part of two states is equal.
    /// The cached public key and the in-flight locks are ignored.
    pub fn is_equivalent_to(&self, other: &Self) -> Result<(), String> {
        if self.ecdsa_key_name != other.ecdsa_key_name {
            return Err(format!(
                "ecdsa_key_name differs: {} vs {}",
                self.ecdsa_key_name, other.ecdsa_key_name
            ));
        }
        if self.setup_authority != other.setup_authority {
            return Err("setup_authority differs".to_string());
        }
        if self.signer_set != other.signer_set {
            return Err("signer_set differs".to_string());
        }
        if self.next_id != other.next_id {
            return Err(format!(
                "next_id differs: {} vs {}",
                self.next_id, other.next_id
            ));
        }
        if self.messages != other.messages || self.message_ids != other.message_ids {
            return Err("messages differ".to_string());
        }
        Ok(())
    }
}

/// Mutates (part of) the current state using `f`.
///
/// Panics if there is no state.
pub fn mutate_state<F, R>(f: F) -> R
where
    F: FnOnce(&mut State) -> R,
{
    __STATE.with(|s| f(s.borrow_mut().as_mut().expect("State not initialized!")))
}

/// Read (part of) the current state using `f`.
///
/// Panics if there is no state.
pub fn read_state<F, R>(f: F) -> R
where
    F: FnOnce(&State) -> R,
{
    __STATE.with(|s| f(s.borrow().as_ref().expect("State not initialized!")))
}

/// Replaces the current state.
pub fn replace_state(state: State) {
    __STATE.with(|s| {
        *s.borrow_mut() = Some(state);
    });
}
